//! Identifier newtypes shared across the scheduler.
//!
//! Node ids are worker-chosen opaque strings; everything else the
//! orchestrator mints itself as a v4 UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

uuid_id!(SessionId);
uuid_id!(JobId);
uuid_id!(DeploymentId);
uuid_id!(ClientId);
uuid_id!(AccountId);
uuid_id!(WorkspaceId);
uuid_id!(ReservationId);

/// Worker-chosen identifier for a physical/logical node. Unique across live
/// sessions (enforced by the Node Registry, not by this type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Flow-scoped node identifier (unique within one flow, not globally).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct FlowNodeId(pub String);

impl fmt::Display for FlowNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Single-use 8-character share key issued at worker registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareKey(pub String);

impl fmt::Display for ShareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

const SHARE_KEY_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generates a fresh share key, excluding visually confusable characters
/// (0/O, 1/I/L) per the worker-onboarding flow.
pub fn generate_share_key() -> ShareKey {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let key: String = (0..8)
        .map(|_| {
            let idx = rng.gen_range(0..SHARE_KEY_ALPHABET.len());
            SHARE_KEY_ALPHABET[idx] as char
        })
        .collect();
    ShareKey(key)
}
