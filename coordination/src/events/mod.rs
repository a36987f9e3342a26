//! Coordination events
//!
//! Session lifecycle, team selection, retries, fallbacks and call
//! completion are published on a broadcast bus so observers (a UI, a
//! logger, a test) can follow coordination without polling.
//!
//! ```ignore
//! let mut events = coordinator.subscribe();
//! let result = coordinator.coordinate(request).await?;
//! while let Ok(event) = events.try_recv() {
//!     println!("{}", event.event_type());
//! }
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus, CHANNEL_CAPACITY};
pub use types::CoordinationEvent;
