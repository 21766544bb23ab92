// ============================================================================
// File: src/fabric/netns/mod.rs
// ----------------------------------------------------------------------------
// Linux link fabric.
//
// Switches are Linux bridges in the host namespace. Every link is a veth
// pair: a node end is moved into the node's namespace and renamed to its
// interface name, a switch end is enslaved to the bridge. Shaping is
// installed with tc on the egress of both ends.
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, info, warn};
use uuid::Uuid;

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::backends::HealthStatus;
use crate::fabric::config::FabricConfig;
use crate::fabric::errors::{FabricError, FabricResult};
use crate::fabric::trait_def::LinkFabric;
use crate::fabric::types::{Attachment, LinkEnd, LinkHandle, SwitchHandle};
use crate::handle::UseGuard;
use crate::linux::{EnvironmentDetector, PrivilegeManager, SysResult};
use crate::topology::ShapingPolicy;

mod qdisc;

use qdisc::Device;


const REQUIRED_TOOLS: &[&str] = &["ip", "tc"];

/// Link fabric built on bridges, veth pairs and tc.
#[derive(Debug, Clone)]
pub struct NetnsFabric {
    config: FabricConfig,
    privilege: PrivilegeManager,
    session: String,
    next_device: Arc<AtomicU32>,
}

impl NetnsFabric {
    pub fn new(config: FabricConfig) -> FabricResult<Self> {
        if !cfg!(target_os = "linux") {
            return Err(FabricError::NotAvailable {
                fabric: "netns",
                reason: "veth and bridge devices are only available on Linux".to_string(),
            });
        }
        let privilege = PrivilegeManager::new(config.use_sudo, config.command_timeout);
        let session = Uuid::new_v4().simple().to_string()[..4].to_string();
        Ok(Self {
            config,
            privilege,
            session,
            next_device: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Next host device name of the given kind (`b` bridge, `l` link).
    fn device_name(&self, kind: char) -> String {
        let seq = self.next_device.fetch_add(1, Ordering::Relaxed);
        format!("{}{}{}{}", self.config.device_prefix, self.session, kind, seq)
    }

    async fn create_bridge(&self, name: String) -> FabricResult<SwitchHandle> {
        let bridge = self.device_name('b');
        let failed = |e: crate::linux::SysError| FabricError::SwitchFailed {
            switch: name.clone(),
            details: e.to_string(),
        };

        self.privilege
            .run_checked(&["ip", "link", "add", "name", &bridge, "type", "bridge"])
            .await
            .map_err(failed)?;
        if let Err(e) = self.privilege.run_checked(&["ip", "link", "set", &bridge, "up"]).await {
            if let Err(cleanup) = self.privilege.run_idempotent(&["ip", "link", "del", &bridge]).await {
                warn!("Failed to cleanup bridge {}: {}", bridge, cleanup);
            }
            return Err(failed(e));
        }

        info!("switch {} realized as bridge {}", name, bridge);
        Ok(SwitchHandle::new(name, bridge))
    }

    async fn connect_pair(
        &self,
        a: Attachment,
        b: Attachment,
        shaping: Option<ShapingPolicy>,
    ) -> FabricResult<LinkHandle> {
        let label = format!("{}--{}", a.name(), b.name());
        if let Some(policy) = &shaping {
            policy.validate().map_err(|e| FabricError::InvalidShaping {
                link: label.clone(),
                details: e.to_string(),
            })?;
        }

        // Both endpoints stay live until the link exists.
        let _guard_a = hold(&a).await?;
        let _guard_b = hold(&b).await?;

        let base = self.device_name('l');
        let peers = [format!("{base}a"), format!("{base}b")];
        let connect_failed = |details: String| FabricError::ConnectFailed {
            link: label.clone(),
            details,
        };

        self.privilege
            .run_checked(&["ip", "link", "add", &peers[0], "type", "veth", "peer", "name", &peers[1]])
            .await
            .map_err(|e| connect_failed(e.to_string()))?;

        let mut placed: Vec<LinkEnd> = Vec::with_capacity(2);
        for (attachment, peer) in [(&a, &peers[0]), (&b, &peers[1])] {
            match self.place(attachment, peer).await {
                Ok(end) => placed.push(end),
                Err(e) => {
                    self.discard(&peers, &placed).await;
                    return Err(connect_failed(e.to_string()));
                }
            }
        }
        let [end_a, end_b]: [LinkEnd; 2] = placed
            .try_into()
            .map_err(|_| FabricError::Internal {
                message: format!("link {label} placed an unexpected number of ends"),
            })?;

        let link = LinkHandle::new([end_a, end_b], None);
        if let Some(policy) = shaping {
            if let Err(e) = self.apply_shaping(&link, Some(&policy)).await {
                self.discard(&peers, link.ends()).await;
                return Err(e);
            }
            link.set_shaping(Some(policy));
        }

        info!("link {} connected ({} <-> {})", label, link.ends()[0].device, link.ends()[1].device);
        Ok(link)
    }

    /// Move one veth end to where `attachment` needs it.
    async fn place(&self, attachment: &Attachment, device: &str) -> SysResult<LinkEnd> {
        match attachment {
            Attachment::Node { handle, interface } => {
                let ns = handle.namespace();
                self.privilege.run_checked(&["ip", "link", "set", device, "netns", ns]).await?;
                self.privilege
                    .run_checked(&["ip", "-n", ns, "link", "set", "dev", device, "name", interface])
                    .await?;
                self.privilege
                    .run_checked(&["ip", "-n", ns, "link", "set", "dev", interface, "up"])
                    .await?;
                Ok(LinkEnd {
                    endpoint: handle.name().to_string(),
                    namespace: Some(ns.to_string()),
                    device: interface.clone(),
                })
            }
            Attachment::Switch(switch) => {
                self.privilege
                    .run_checked(&["ip", "link", "set", device, "master", switch.device()])
                    .await?;
                self.privilege.run_checked(&["ip", "link", "set", device, "up"]).await?;
                Ok(LinkEnd {
                    endpoint: switch.name().to_string(),
                    namespace: None,
                    device: device.to_string(),
                })
            }
        }
    }

    /// Best-effort removal of a half-built veth pair.
    async fn discard(&self, peers: &[String; 2], placed: &[LinkEnd]) {
        // Deleting either end of a veth pair deletes both.
        for peer in peers {
            if let Err(e) = self.privilege.run_idempotent(&["ip", "link", "del", peer]).await {
                warn!("Failed to cleanup veth {}: {}", peer, e);
            }
        }
        for end in placed {
            if let Err(e) = self.delete_end(end).await {
                warn!("Failed to cleanup link end {}: {}", end.device, e);
            }
        }
    }

    async fn delete_end(&self, end: &LinkEnd) -> SysResult<()> {
        match &end.namespace {
            Some(ns) => {
                self.privilege
                    .run_idempotent(&["ip", "-n", ns, "link", "del", &end.device])
                    .await
            }
            None => self.privilege.run_idempotent(&["ip", "link", "del", &end.device]).await,
        }
    }

    /// Replace the qdiscs on both ends of `link`.
    async fn apply_shaping(&self, link: &LinkHandle, policy: Option<&ShapingPolicy>) -> FabricResult<()> {
        let shaping_failed = |details: String| FabricError::ShapingFailed {
            link: link.label().to_string(),
            details,
        };

        for end in link.ends() {
            let device = Device {
                namespace: end.namespace.as_deref(),
                name: &end.device,
            };
            let clear = qdisc::clear(device);
            let clear: Vec<&str> = clear.iter().map(String::as_str).collect();
            // Fails when no root qdisc is installed; install reports real errors.
            if let Err(e) = self.privilege.run_checked(&clear).await {
                debug!("no root qdisc cleared on {}: {}", end.device, e);
            }

            let Some(policy) = policy else { continue };
            for command in qdisc::install(device, policy) {
                let args: Vec<&str> = command.iter().map(String::as_str).collect();
                self.privilege
                    .run_checked(&args)
                    .await
                    .map_err(|e| shaping_failed(e.to_string()))?;
            }
        }
        debug!("shaping on {} set to {:?}", link.label(), policy);
        Ok(())
    }
}

async fn hold(attachment: &Attachment) -> FabricResult<UseGuard> {
    attachment
        .token()
        .acquire()
        .await
        .ok_or_else(|| FabricError::EndpointUnavailable {
            endpoint: attachment.name().to_string(),
        })
}

impl LinkFabric for NetnsFabric {
    fn add_switch(&self, name: String) -> AsyncTask<FabricResult<SwitchHandle>> {
        let this = self.clone();
        AsyncTaskBuilder::new(async move { this.create_bridge(name).await }).spawn()
    }

    fn remove_switch(&self, switch: &SwitchHandle) -> AsyncTask<FabricResult<()>> {
        let this = self.clone();
        let switch = switch.clone();
        AsyncTaskBuilder::new(async move {
            let Some(release) = switch.token().begin_release().await else {
                return Ok(());
            };
            this.privilege
                .run_idempotent(&["ip", "link", "del", switch.device()])
                .await
                .map_err(|e| FabricError::RemoveFailed {
                    switch: switch.name().to_string(),
                    details: e.to_string(),
                })?;
            release.complete();
            info!("switch {} removed", switch.name());
            Ok(())
        })
        .spawn()
    }

    fn connect(&self, a: Attachment, b: Attachment, shaping: Option<ShapingPolicy>) -> AsyncTask<FabricResult<LinkHandle>> {
        let this = self.clone();
        AsyncTaskBuilder::new(async move { this.connect_pair(a, b, shaping).await }).spawn()
    }

    fn reshape(&self, link: &LinkHandle, shaping: Option<ShapingPolicy>) -> AsyncTask<FabricResult<()>> {
        let this = self.clone();
        let link = link.clone();
        AsyncTaskBuilder::new(async move {
            if let Some(policy) = &shaping {
                policy.validate().map_err(|e| FabricError::InvalidShaping {
                    link: link.label().to_string(),
                    details: e.to_string(),
                })?;
            }
            let Some(_guard) = link.token().acquire().await else {
                return Err(FabricError::EndpointUnavailable {
                    endpoint: link.label().to_string(),
                });
            };
            this.apply_shaping(&link, shaping.as_ref()).await?;
            link.set_shaping(shaping);
            Ok(())
        })
        .spawn()
    }

    fn disconnect(&self, link: &LinkHandle) -> AsyncTask<FabricResult<()>> {
        let this = self.clone();
        let link = link.clone();
        AsyncTaskBuilder::new(async move {
            let Some(release) = link.token().begin_release().await else {
                return Ok(());
            };
            for end in link.ends() {
                this.delete_end(end).await.map_err(|e| FabricError::DisconnectFailed {
                    link: link.label().to_string(),
                    details: e.to_string(),
                })?;
            }
            release.complete();
            info!("link {} disconnected", link.label());
            Ok(())
        })
        .spawn()
    }

    fn health_check(&self) -> AsyncTask<HealthStatus> {
        let privilege = self.privilege.clone();
        AsyncTaskBuilder::new(async move {
            let tools = EnvironmentDetector::tools(REQUIRED_TOOLS);
            let missing: Vec<&str> = tools.iter().filter(|t| !t.available).map(|t| t.name).collect();
            if !missing.is_empty() {
                return HealthStatus::unhealthy(format!("Missing host tools: {}", missing.join(", ")));
            }
            if privilege.uses_sudo() && !EnvironmentDetector::has_passwordless_sudo() {
                return HealthStatus::unhealthy("Link fabric needs root or passwordless sudo");
            }
            HealthStatus::healthy("Link fabric ready").with_metric("sudo", privilege.uses_sudo().to_string())
        })
        .spawn()
    }

    fn get_config(&self) -> &FabricConfig {
        &self.config
    }

    fn fabric_type(&self) -> &'static str {
        "netns"
    }
}
