//! Services around the calculation core: catalog browsing, the ready signal
//! and background workers that talk to callers only through channels.

pub mod market;
pub mod price;
pub mod ready;
pub mod search;

pub use market::{Market, MetaGroupInfo, SearchFilter, SystemEffectEntry};
pub use price::{Price, PriceHandle, PriceSource, PriceWait, PriceWorker, StaticPriceSource};
pub use ready::{ReadySignal, ReadyWaiter};
pub use search::{SearchHandle, SearchTicket, SearchWorker};
