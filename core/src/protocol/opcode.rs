//! Method ids carried by `Notify` envelopes.

/// Synthetic sentinel enqueued when the active game server changes.
/// Never appears on the wire.
pub const SERVER_CHANGE_METHOD_ID: u32 = 0xFFFF_FFFF;

/// Decoded record kinds the pipeline understands. Anything else coming
/// off the wire is dropped before it reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    ServerChange,
    SyncNearEntities,
    SyncContainerData,
    SyncServerTime,
    SyncToMeDeltaInfo,
    SyncNearDeltaInfo,
}

impl Opcode {
    pub fn from_method_id(id: u32) -> Option<Self> {
        match id {
            SERVER_CHANGE_METHOD_ID => Some(Self::ServerChange),
            0x06 => Some(Self::SyncNearEntities),
            0x15 => Some(Self::SyncContainerData),
            0x2b => Some(Self::SyncServerTime),
            0x2e => Some(Self::SyncToMeDeltaInfo),
            0x2d => Some(Self::SyncNearDeltaInfo),
            _ => None,
        }
    }

    pub fn method_id(self) -> u32 {
        match self {
            Self::ServerChange => SERVER_CHANGE_METHOD_ID,
            Self::SyncNearEntities => 0x06,
            Self::SyncContainerData => 0x15,
            Self::SyncServerTime => 0x2b,
            Self::SyncToMeDeltaInfo => 0x2e,
            Self::SyncNearDeltaInfo => 0x2d,
        }
    }
}
