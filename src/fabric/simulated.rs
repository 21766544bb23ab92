// ============================================================================
// File: src/fabric/simulated.rs
// ----------------------------------------------------------------------------
// In-memory link fabric recording into a SimulationJournal.
// ============================================================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use uuid::Uuid;

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::backends::HealthStatus;
use crate::fabric::config::FabricConfig;
use crate::fabric::errors::{FabricError, FabricResult};
use crate::fabric::trait_def::LinkFabric;
use crate::fabric::types::{Attachment, LinkEnd, LinkHandle, SwitchHandle};
use crate::simulation::{FaultPlan, JournalEvent, SimulationJournal};
use crate::topology::ShapingPolicy;

/// Fabric that creates no devices.
#[derive(Debug, Clone)]
pub struct SimulatedFabric {
    config: FabricConfig,
    journal: SimulationJournal,
    faults: Arc<FaultPlan>,
    switches: Arc<Mutex<HashMap<Uuid, String>>>,
    links: Arc<Mutex<HashMap<Uuid, String>>>,
}

impl SimulatedFabric {
    pub fn new(config: FabricConfig) -> Self {
        Self {
            config,
            journal: SimulationJournal::new(),
            faults: Arc::new(FaultPlan::default()),
            switches: Arc::new(Mutex::new(HashMap::new())),
            links: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_journal(mut self, journal: SimulationJournal) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = Arc::new(faults);
        self
    }

    pub fn journal(&self) -> &SimulationJournal {
        &self.journal
    }

    pub fn live_switches(&self) -> usize {
        lock(&self.switches).len()
    }

    pub fn live_links(&self) -> usize {
        lock(&self.links).len()
    }
}

fn lock(map: &Mutex<HashMap<Uuid, String>>) -> MutexGuard<'_, HashMap<Uuid, String>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn end_for(attachment: &Attachment) -> LinkEnd {
    match attachment {
        Attachment::Node { handle, interface } => LinkEnd {
            endpoint: handle.name().to_string(),
            namespace: Some(handle.namespace().to_string()),
            device: interface.clone(),
        },
        Attachment::Switch(switch) => LinkEnd {
            endpoint: switch.name().to_string(),
            namespace: None,
            device: switch.device().to_string(),
        },
    }
}

impl LinkFabric for SimulatedFabric {
    fn add_switch(&self, name: String) -> AsyncTask<FabricResult<SwitchHandle>> {
        let this = self.clone();
        AsyncTaskBuilder::new(async move {
            if this.faults.switch_fails(&name) {
                return Err(FabricError::SwitchFailed {
                    switch: name,
                    details: "injected switch failure".to_string(),
                });
            }
            let handle = SwitchHandle::new(name.clone(), format!("sim-br-{name}"));
            lock(&this.switches).insert(handle.id(), name.clone());
            this.journal.record(JournalEvent::SwitchCreated(name));
            Ok(handle)
        })
        .spawn()
    }

    fn remove_switch(&self, switch: &SwitchHandle) -> AsyncTask<FabricResult<()>> {
        let this = self.clone();
        let switch = switch.clone();
        AsyncTaskBuilder::new(async move {
            let Some(release) = switch.token().begin_release().await else {
                return Ok(());
            };
            if this.faults.switch_removal_fails(switch.name()) {
                return Err(FabricError::RemoveFailed {
                    switch: switch.name().to_string(),
                    details: "injected removal failure".to_string(),
                });
            }
            lock(&this.switches).remove(&switch.id());
            this.journal.record(JournalEvent::SwitchRemoved(switch.name().to_string()));
            release.complete();
            Ok(())
        })
        .spawn()
    }

    fn connect(&self, a: Attachment, b: Attachment, shaping: Option<ShapingPolicy>) -> AsyncTask<FabricResult<LinkHandle>> {
        let this = self.clone();
        AsyncTaskBuilder::new(async move {
            let label = format!("{}--{}", a.name(), b.name());
            if let Some(policy) = &shaping {
                policy.validate().map_err(|e| FabricError::InvalidShaping {
                    link: label.clone(),
                    details: e.to_string(),
                })?;
            }

            let mut guards = Vec::with_capacity(2);
            for attachment in [&a, &b] {
                match attachment.token().acquire().await {
                    Some(guard) => guards.push(guard),
                    None => {
                        return Err(FabricError::EndpointUnavailable {
                            endpoint: attachment.name().to_string(),
                        });
                    }
                }
            }
            if this.faults.connect_fails(a.name(), b.name()) {
                return Err(FabricError::ConnectFailed {
                    link: label,
                    details: "injected connect failure".to_string(),
                });
            }

            let link = LinkHandle::new([end_for(&a), end_for(&b)], shaping);
            lock(&this.links).insert(link.id(), label.clone());
            this.journal.record(JournalEvent::LinkConnected(label));
            debug!("simulated link {} connected", link.label());
            Ok(link)
        })
        .spawn()
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
            link.set_shaping(shaping);
            this.journal.record(JournalEvent::LinkReshaped(link.label().to_string()));
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
            let [a, b] = link.ends();
            if this.faults.disconnect_fails(&a.endpoint, &b.endpoint) {
                return Err(FabricError::DisconnectFailed {
                    link: link.label().to_string(),
                    details: "injected disconnect failure".to_string(),
                });
            }
            lock(&this.links).remove(&link.id());
            this.journal.record(JournalEvent::LinkDisconnected(link.label().to_string()));
            release.complete();
            Ok(())
        })
        .spawn()
    }

    fn health_check(&self) -> AsyncTask<HealthStatus> {
        let switches = self.live_switches();
        let links = self.live_links();
        AsyncTaskBuilder::new(async move {
            HealthStatus::healthy("Simulated fabric ready")
                .with_metric("live_switches", switches.to_string())
                .with_metric("live_links", links.to_string())
        })
        .spawn()
    }

    fn get_config(&self) -> &FabricConfig {
        &self.config
    }

    fn fabric_type(&self) -> &'static str {
        "simulated"
    }
}
