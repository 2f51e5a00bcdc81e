//! Provider implementations shipped with the daemon.
//!
//! Production hardware bridges (GPS chip driver, network positioning
//! client) integrate behind [`loc_fusion::PositionProvider`]; the simulated
//! source here is the development and integration-test backend.

pub(crate) mod simulated;
