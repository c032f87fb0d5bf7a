mod auction;
mod cbs;

pub use auction::{
    Auction, AuctionOptions, AuctionOutcome, AuctionRound, Bid, PricedCell, PricingStrategy,
};
pub use cbs::Cbs;
