use crate::models::{OrderRequest, TradeSide};
use crate::trader::{BuyDecision, FeeBuyDecision, SellDecision};

/// Order for a triggered decision, `None` for a skip
pub fn buy_order(decision: &BuyDecision) -> Option<OrderRequest> {
    match decision {
        BuyDecision::Buy(position) => Some(OrderRequest {
            symbol: position.symbol.clone(),
            side: TradeSide::Buy,
            quantity: position.quantity,
            price: position.price,
        }),
        BuyDecision::Skip(_) => None,
    }
}

pub fn fee_buy_order(decision: &FeeBuyDecision) -> Option<OrderRequest> {
    match decision {
        FeeBuyDecision::Buy {
            symbol,
            price,
            quantity,
        } => Some(OrderRequest {
            symbol: symbol.clone(),
            side: TradeSide::Buy,
            quantity: *quantity,
            price: *price,
        }),
        FeeBuyDecision::Skip(_) => None,
    }
}

pub fn sell_order(decision: &SellDecision) -> Option<OrderRequest> {
    match decision {
        SellDecision::Sell(intent) => Some(OrderRequest {
            symbol: intent.symbol.clone(),
            side: TradeSide::Sell,
            quantity: intent.quantity,
            price: intent.price,
        }),
        SellDecision::Skip(_) => None,
    }
}
