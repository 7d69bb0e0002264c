//! Approval decisions: the card-side router and the appliance-side gateway.

pub mod gateway;
pub mod router;

pub use gateway::{ApprovalGateway, GatewayRequest};
pub use router::DecisionRouter;
