//! Handler Registry
//!
//! Zero or one callback per category. The receive task invokes them for every
//! dispatched frame; missing handlers are skipped.

use crate::protocol::{Frame, MarketDataMessage, OrderMessage};
use std::sync::{Arc, RwLock};

pub type FrameCallback = Arc<dyn Fn(&Frame) + Send + Sync>;
pub type OrderCallback = Arc<dyn Fn(&OrderMessage) + Send + Sync>;
pub type MarketDataCallback = Arc<dyn Fn(&MarketDataMessage) + Send + Sync>;

/// A callback tagged with the category it is registered under
#[derive(Clone)]
pub enum Handler {
    /// Every dispatched frame
    Generic(FrameCallback),
    /// Frames of an order type whose payload decodes to an order
    Order(OrderCallback),
    /// Market-data frames whose payload decodes to a quote
    MarketData(MarketDataCallback),
}

impl Handler {
    pub fn generic<F>(f: F) -> Self
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        Handler::Generic(Arc::new(f))
    }

    pub fn order<F>(f: F) -> Self
    where
        F: Fn(&OrderMessage) + Send + Sync + 'static,
    {
        Handler::Order(Arc::new(f))
    }

    pub fn market_data<F>(f: F) -> Self
    where
        F: Fn(&MarketDataMessage) + Send + Sync + 'static,
    {
        Handler::MarketData(Arc::new(f))
    }
}

#[derive(Default, Clone)]
struct Slots {
    generic: Option<FrameCallback>,
    order: Option<OrderCallback>,
    market_data: Option<MarketDataCallback>,
}

#[derive(Default)]
pub struct HandlerRegistry {
    slots: RwLock<Slots>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler`, replacing any callback already registered for its category
    pub fn register(&self, handler: Handler) {
        let mut slots = self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        match handler {
            Handler::Generic(f) => slots.generic = Some(f),
            Handler::Order(f) => slots.order = Some(f),
            Handler::MarketData(f) => slots.market_data = Some(f),
        }
    }

    /// Remove every registered callback
    pub fn clear(&self) {
        *self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Slots::default();
    }

    /// Run the generic handler, then the typed handler matching the frame's payload.
    ///
    /// Callbacks run outside the registry lock.
    pub fn dispatch(&self, frame: &Frame) {
        let slots = self.slots.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone();

        if let Some(generic) = &slots.generic {
            generic(frame);
        }

        if frame.msg_type.is_order() {
            if let Some(order) = frame.order_message() {
                log::trace!(
                    "Order received: {} {:?} {} @ {}",
                    order.symbol(),
                    order.side,
                    order.quantity,
                    order.price
                );
                if let Some(handler) = &slots.order {
                    handler(&order);
                }
            }
        } else if let Some(market_data) = frame.market_data_message() {
            log::trace!(
                "Market data received: {} bid={} ask={}",
                market_data.symbol(),
                market_data.bid_price,
                market_data.ask_price
            );
            if let Some(handler) = &slots.market_data {
                handler(&market_data);
            }
        }
    }
}
