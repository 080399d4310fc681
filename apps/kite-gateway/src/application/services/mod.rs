//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `StreamManager`: Owns the live ticker session and the price table
//! - `GatewayService`: Login, portfolio reads and the dashboard view

mod gateway;
mod stream_manager;

pub use gateway::{AuthStatus, DashboardData, GatewayError, GatewayService, UserSummary};
pub use stream_manager::{StreamManager, StreamStatus};
