//! Picking engine
//!
//! Two behaviors share the renderer's pick sensors:
//!
//! - [`PickingCoordinator`]: elevation picking, one ray sensor resolving a
//!   queue of requests
//! - [`CollisionMonitor`]: one volume sensor per entity reporting overlaps
//!   with every other proxy

pub mod collision;
pub mod coordinator;
pub mod echo;
pub mod request;

pub use collision::{CollisionMonitor, ProxyRegistration};
pub use coordinator::{PickPhase, PickingCoordinator};
pub use echo::{CompletedPickRecord, EchoFilter};
pub use request::{Enqueued, PendingPickQueue, PickKey, PickRequest};
