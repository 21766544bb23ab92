// ============================================================================
// File: src/fabric/netns/qdisc.rs
// ----------------------------------------------------------------------------
// Rendering of shaping policies into tc qdisc commands.
//
// With a rate cap, a TBF root qdisc enforces bandwidth and netem hangs below
// it for delay/loss. Without one, netem is the root qdisc.
// ============================================================================

use crate::topology::ShapingPolicy;

/// Host-namespace (or namespaced) location of a device to shape.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Device<'a> {
    pub namespace: Option<&'a str>,
    pub name: &'a str,
}

impl Device<'_> {
    /// `tc` invocation prefix for this device's namespace.
    fn tc(&self) -> Vec<String> {
        match self.namespace {
            Some(ns) => ["ip", "netns", "exec", ns, "tc"].map(String::from).to_vec(),
            None => vec!["tc".to_string()],
        }
    }
}

/// Command that removes any root qdisc from `device`.
pub(crate) fn clear(device: Device<'_>) -> Vec<String> {
    let mut args = device.tc();
    args.extend(["qdisc", "del", "dev", device.name, "root"].map(String::from));
    args
}

/// Commands that install `policy` on `device`, assuming a clean root.
///
/// Returns nothing for an unconstrained policy.
pub(crate) fn install(device: Device<'_>, policy: &ShapingPolicy) -> Vec<Vec<String>> {
    if policy.is_unconstrained() {
        return Vec::new();
    }

    let mut commands = Vec::new();
    if policy.has_rate_limit() {
        let kbit = rate_kbit(policy.bandwidth_mbit);
        // burst = max(rate_bytes/10, 1540): at least one MTU
        let burst = (kbit * 1000 / 8).max(15400) / 10;

        let mut tbf = device.tc();
        tbf.extend(["qdisc", "add", "dev", device.name, "root", "handle", "1:", "tbf"].map(String::from));
        tbf.extend([
            "rate".to_string(),
            format!("{kbit}kbit"),
            "burst".to_string(),
            burst.to_string(),
            "latency".to_string(),
            "1s".to_string(),
        ]);
        commands.push(tbf);

        if policy.has_emulation() {
            let mut netem = device.tc();
            netem.extend(
                ["qdisc", "add", "dev", device.name, "parent", "1:1", "handle", "10:", "netem"].map(String::from),
            );
            netem.extend(netem_params(policy));
            commands.push(netem);
        }
    } else {
        let mut netem = device.tc();
        netem.extend(["qdisc", "add", "dev", device.name, "root", "netem"].map(String::from));
        netem.extend(netem_params(policy));
        commands.push(netem);
    }
    commands
}

fn rate_kbit(mbit: f64) -> u64 {
    ((mbit * 1000.0).round() as u64).max(1)
}

fn netem_params(policy: &ShapingPolicy) -> Vec<String> {
    let mut args = Vec::new();

    if !policy.delay.is_zero() {
        args.push("delay".into());
        args.push(format!("{}us", policy.delay.as_micros()));
        if !policy.jitter.is_zero() {
            args.push(format!("{}us", policy.jitter.as_micros()));
        }
    }
    if policy.loss > 0.0 {
        args.push("loss".into());
        args.push(format!("{}%", (policy.loss * 1e6).round() / 1e4));
    }
    if let Some(limit) = policy.max_queue {
        args.push("limit".into());
        args.push(limit.to_string());
    }
    args
}
