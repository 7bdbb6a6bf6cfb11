use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResult {
    pub granted: bool,
    pub denied: bool,
    pub never_asked: bool,
}

impl PermissionResult {
    pub fn granted() -> Self {
        Self {
            granted: true,
            denied: false,
            never_asked: false,
        }
    }

    pub fn denied() -> Self {
        Self {
            granted: false,
            denied: true,
            never_asked: false,
        }
    }

    pub fn never_asked() -> Self {
        Self {
            granted: false,
            denied: false,
            never_asked: true,
        }
    }
}

// `resolve` consumes the continuation, so a request is answered once.
pub struct PermissionContinuation {
    resolve: Box<dyn FnOnce(PermissionResult) + Send>,
}

impl PermissionContinuation {
    pub fn new(resolve: impl FnOnce(PermissionResult) + Send + 'static) -> Self {
        Self {
            resolve: Box::new(resolve),
        }
    }

    pub fn resolve(self, result: PermissionResult) {
        (self.resolve)(result);
    }
}

impl std::fmt::Debug for PermissionContinuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PermissionContinuation")
    }
}

pub trait PermissionProvider: Send + Sync {
    fn check(&self) -> PermissionResult;

    fn request(&self, continuation: PermissionContinuation);
}

#[cfg(feature = "microphone")]
#[derive(Debug, Clone, Default)]
pub struct DevicePermissions;

#[cfg(feature = "microphone")]
impl PermissionProvider for DevicePermissions {
    fn check(&self) -> PermissionResult {
        use cpal::traits::HostTrait;

        if cpal::default_host().default_input_device().is_some() {
            PermissionResult::granted()
        } else {
            PermissionResult::denied()
        }
    }

    fn request(&self, continuation: PermissionContinuation) {
        continuation.resolve(self.check());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn serializes_never_asked_in_camel_case() {
        let json = serde_json::to_value(PermissionResult::never_asked())
            .expect("permission result should serialize");
        assert_eq!(
            json,
            serde_json::json!({ "granted": false, "denied": false, "neverAsked": true })
        );
    }

    #[test]
    fn continuation_runs_once_with_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let continuation = PermissionContinuation::new(move |result| {
            assert!(result.granted);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        continuation.resolve(PermissionResult::granted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
