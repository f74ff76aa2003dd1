//! Exchange-agnostic domain logic.

mod ids;
mod money;
mod opportunity;
mod orderbook;
mod pair;
mod quote;
mod risk;
mod trade;

pub use ids::{OpportunityId, VenueId};
pub use money::{percent_of, Percent, Price, Volume};
pub use opportunity::{
    Opportunity, OpportunityBuildError, OpportunityBuilder, OpportunitySnapshot,
    OpportunityStatus,
};
pub use orderbook::{OrderBook, PriceLevel};
pub use pair::TradingPair;
pub use quote::{BestQuotes, PriceQuote, VenueQuote};
pub use risk::RiskProfile;
pub use trade::{FailureReason, LegResult, OrderSide, TradeOutcome, TradeResult};
