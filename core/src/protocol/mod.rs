pub mod attr;
pub mod message;
pub mod opcode;

pub use attr::{EntityAttrs, is_valid_name};
pub use message::{
    AoiSyncDelta, Attr, AttrCollection, CharBaseInfo, CharSerialize, DamageKind, SkillEffect,
    SyncContainerData, SyncDamageInfo, SyncEntity, SyncNearDeltaInfo, SyncNearEntities,
    SyncToMeDeltaInfo,
};
pub use opcode::Opcode;
