pub mod identity;
pub mod error;
pub mod faults;
pub mod vsphere;
pub mod expand;
pub mod flatten;
pub mod platform;
pub mod reconcile;

pub use error::{ApplyError, IdentityError, RemoteError, SwitchError, ValidationError};
pub use faults::{FaultClass, FaultKind, RemoteFault, RetryPolicy};
pub use identity::SwitchIdentity;
pub use platform::{ReconcileContext, SwitchPlatform};
pub use reconcile::SwitchReconciler;

/// Uplink port names a distributed switch gets when none are declared.
pub const DEFAULT_DVS_UPLINKS: [&str; 4] = ["uplink1", "uplink2", "uplink3", "uplink4"];

pub fn default_dvs_uplinks() -> Vec<String> {
    DEFAULT_DVS_UPLINKS.iter().map(|u| u.to_string()).collect()
}
