//! Display target ownership
//!
//! Only one pump may drive a surface at a time. Claims are tracked in a
//! process-wide registry and dropped with the session.

use std::collections::HashSet;
use std::sync::Mutex;

use lazy_static::lazy_static;
use log::debug;

use crate::error::{Error, Result};
use crate::media::DisplayTarget;

lazy_static! {
    static ref CLAIMED_TARGETS: Mutex<HashSet<u64>> = Mutex::new(HashSet::new());
}

/// Exclusive claim on a display target, released on drop
#[derive(Debug)]
pub struct TargetClaim {
    id: u64,
}

impl TargetClaim {
    pub fn acquire<T: DisplayTarget>(target: &T) -> Result<Self> {
        if !target.is_valid() {
            return Err(Error::TargetUnavailable);
        }
        let id = target.target_id();
        let mut claimed = CLAIMED_TARGETS.lock().unwrap_or_else(|e| e.into_inner());
        if !claimed.insert(id) {
            return Err(Error::TargetInUse(id));
        }
        debug!("Claimed display target {:#x}", id);
        Ok(Self { id })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for TargetClaim {
    fn drop(&mut self) {
        let mut claimed = CLAIMED_TARGETS.lock().unwrap_or_else(|e| e.into_inner());
        claimed.remove(&self.id);
        debug!("Released display target {:#x}", self.id);
    }
}

/// Whether some live session currently holds `target`
pub fn is_claimed<T: DisplayTarget>(target: &T) -> bool {
    CLAIMED_TARGETS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .contains(&target.target_id())
}
