//! The live resources of the trading client, each a `Subscription` over
//! its own state type.

pub mod balances;
pub mod chat;
pub mod notifications;
pub mod prices;

pub use balances::{Balances, WalletBalance};
pub use chat::{ChatMessage, ChatView, TradeChat};
pub use notifications::{Notification, Notifications, NotificationsView};
pub use prices::{PriceQuote, PriceTicker, PublicPriceFetcher};
