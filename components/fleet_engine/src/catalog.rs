use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::collaborators::Hypervisor;
use crate::error::Result;

/// Per-run memo of hypervisor existence checks. A single run never needs to
/// see infrastructure change underneath it, so each network or template name
/// is asked of the hypervisor at most once. A failed check is memoized as
/// absent; the first caller sees the error and logs it.
pub struct InfraCatalog {
    hypervisor: Arc<dyn Hypervisor>,
    networks: Mutex<HashMap<String, bool>>,
    templates: Mutex<HashMap<String, bool>>,
}

impl InfraCatalog {
    pub fn new(hypervisor: Arc<dyn Hypervisor>) -> Self {
        Self {
            hypervisor,
            networks: Mutex::new(HashMap::new()),
            templates: Mutex::new(HashMap::new()),
        }
    }

    pub async fn network_exists(&self, name: &str) -> Result<bool> {
        if let Some(known) = self.networks.lock().get(name) {
            return Ok(*known);
        }

        match self.hypervisor.network_exists(name).await {
            Ok(exists) => {
                self.networks.lock().insert(name.to_string(), exists);
                Ok(exists)
            }
            Err(e) => {
                self.networks.lock().insert(name.to_string(), false);
                Err(e)
            }
        }
    }

    pub async fn template_exists(&self, name: &str) -> Result<bool> {
        if let Some(known) = self.templates.lock().get(name) {
            return Ok(*known);
        }

        match self.hypervisor.template_exists(name).await {
            Ok(exists) => {
                self.templates.lock().insert(name.to_string(), exists);
                Ok(exists)
            }
            Err(e) => {
                self.templates.lock().insert(name.to_string(), false);
                Err(e)
            }
        }
    }
}
