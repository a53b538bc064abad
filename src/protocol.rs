//! Protocol Module
//!
//! Fixed-size binary wire format shared with the matching server. Every frame is
//! exactly [`FRAME_SIZE`] bytes, little-endian, with a 32-byte envelope followed by
//! a fixed-capacity payload area. Order and market-data messages travel inside the
//! payload area.
//!
//! ```text
//!  0      8      16   17   18   20      24      28      32            256
//!  +------+------+----+----+----+-------+-------+-------+-------------+
//!  |  id  |  ts  |type|stat|rsvd|source |  dest |  len  |   payload   |
//!  +------+------+----+----+----+-------+-------+-------+-------------+
//! ```

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Total encoded size of a frame in bytes
pub const FRAME_SIZE: usize = 256;
/// Size of the frame envelope preceding the payload area
pub const HEADER_SIZE: usize = 32;
/// Capacity of the payload area
pub const PAYLOAD_CAPACITY: usize = FRAME_SIZE - HEADER_SIZE;
/// Fixed width of instrument symbols, NUL padded
pub const SYMBOL_LEN: usize = 16;

/// Decoding error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid buffer length: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

// ============================================================================
// Envelope Tags
// ============================================================================

/// Frame type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Heartbeat,
    OrderNew,
    OrderCancel,
    OrderReplace,
    OrderFill,
    OrderReject,
    MarketData,
    /// Tag not known to this client, kept verbatim
    Unknown(u8),
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Heartbeat,
            1 => Self::OrderNew,
            2 => Self::OrderCancel,
            3 => Self::OrderReplace,
            4 => Self::OrderFill,
            5 => Self::OrderReject,
            6 => Self::MarketData,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Heartbeat => 0,
            Self::OrderNew => 1,
            Self::OrderCancel => 2,
            Self::OrderReplace => 3,
            Self::OrderFill => 4,
            Self::OrderReject => 5,
            Self::MarketData => 6,
            Self::Unknown(other) => other,
        }
    }

    /// True for every type whose payload carries an [`OrderMessage`]
    pub fn is_order(self) -> bool {
        matches!(
            self,
            Self::OrderNew | Self::OrderCancel | Self::OrderReplace | Self::OrderFill | Self::OrderReject
        )
    }
}

/// Frame status tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    Pending,
    Acknowledged,
    Rejected,
    Filled,
    Unknown(u8),
}

impl MessageStatus {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Pending,
            1 => Self::Acknowledged,
            2 => Self::Rejected,
            3 => Self::Filled,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Acknowledged => 1,
            Self::Rejected => 2,
            Self::Filled => 3,
            Self::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    fn from_byte(byte: u8) -> Self {
        if byte == 1 {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    fn from_byte(byte: u8) -> Self {
        if byte == 0 {
            OrderType::Market
        } else {
            OrderType::Limit
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            OrderType::Market => 0,
            OrderType::Limit => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Day,
    GoodTillCancelled,
    ImmediateOrCancel,
}

impl TimeInForce {
    fn from_byte(byte: u8) -> Self {
        match byte {
            1 => TimeInForce::GoodTillCancelled,
            2 => TimeInForce::ImmediateOrCancel,
            _ => TimeInForce::Day,
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            TimeInForce::Day => 0,
            TimeInForce::GoodTillCancelled => 1,
            TimeInForce::ImmediateOrCancel => 2,
        }
    }
}

// ============================================================================
// Byte Helpers
// ============================================================================

/// Little-endian cursor over a fixed buffer. Callers check lengths up front.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    fn u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.put(&v.to_le_bytes());
    }
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), DecodeError> {
    if buf.len() < expected {
        return Err(DecodeError::Length {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Copy `symbol` into a NUL-padded fixed field, truncating so the last byte stays NUL.
pub fn encode_symbol(symbol: &str) -> [u8; SYMBOL_LEN] {
    let mut out = [0u8; SYMBOL_LEN];
    let bytes = symbol.as_bytes();
    let len = bytes.len().min(SYMBOL_LEN - 1);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

fn decode_symbol(raw: &[u8; SYMBOL_LEN]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(SYMBOL_LEN);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

// ============================================================================
// Frame
// ============================================================================

/// One fixed-size unit on the TCP stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub id: u64,
    /// Nanoseconds since the UNIX epoch, 0 when unset
    pub timestamp: u64,
    pub msg_type: MessageType,
    pub status: MessageStatus,
    pub source_id: u32,
    pub destination_id: u32,
    /// Number of meaningful bytes in `payload`
    pub payload_size: u32,
    pub payload: [u8; PAYLOAD_CAPACITY],
}

impl Frame {
    /// Create a pending frame with a fresh id and the current timestamp
    pub fn new(msg_type: MessageType, source_id: u32) -> Self {
        Self {
            id: generate_message_id(),
            timestamp: now_nanos(),
            msg_type,
            status: MessageStatus::Pending,
            source_id,
            destination_id: 0,
            payload_size: 0,
            payload: [0u8; PAYLOAD_CAPACITY],
        }
    }

    /// Zero-payload keep-alive frame
    pub fn heartbeat(source_id: u32) -> Self {
        Self::new(MessageType::Heartbeat, source_id)
    }

    /// Frame carrying an order in its payload area
    pub fn order(order: &OrderMessage, source_id: u32) -> Self {
        let mut frame = Self::new(MessageType::OrderNew, source_id);
        frame.set_payload(&order.encode());
        frame
    }

    /// Frame carrying a market-data update in its payload area
    pub fn market_data(market_data: &MarketDataMessage, source_id: u32) -> Self {
        let mut frame = Self::new(MessageType::MarketData, source_id);
        frame.set_payload(&market_data.encode());
        frame
    }

    /// Copy `bytes` into the payload area, truncating at capacity, and set the declared length.
    pub fn set_payload(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(PAYLOAD_CAPACITY);
        self.payload = [0u8; PAYLOAD_CAPACITY];
        self.payload[..len].copy_from_slice(&bytes[..len]);
        self.payload_size = len as u32;
    }

    /// Payload bytes within the declared length
    pub fn payload_bytes(&self) -> &[u8] {
        let len = (self.payload_size as usize).min(PAYLOAD_CAPACITY);
        &self.payload[..len]
    }

    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut buf = [0u8; FRAME_SIZE];
        let mut w = Writer::new(&mut buf);
        w.u64(self.id);
        w.u64(self.timestamp);
        w.u8(self.msg_type.as_byte());
        w.u8(self.status.as_byte());
        w.put(&[0u8; 2]);
        w.u32(self.source_id);
        w.u32(self.destination_id);
        w.u32(self.payload_size);
        w.put(&self.payload);
        buf
    }

    /// Decode one frame from the first [`FRAME_SIZE`] bytes of `buf`
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        check_len(buf, FRAME_SIZE)?;
        let mut r = Reader::new(buf);
        let id = r.u64();
        let timestamp = r.u64();
        let msg_type = MessageType::from_byte(r.u8());
        let status = MessageStatus::from_byte(r.u8());
        let _reserved: [u8; 2] = r.take();
        let source_id = r.u32();
        let destination_id = r.u32();
        let payload_size = r.u32();
        let payload = r.take::<PAYLOAD_CAPACITY>();
        Ok(Self {
            id,
            timestamp,
            msg_type,
            status,
            source_id,
            destination_id,
            payload_size,
            payload,
        })
    }

    /// Decode the order sub-message if the type tag and declared length allow it
    pub fn order_message(&self) -> Option<OrderMessage> {
        if !self.msg_type.is_order() || (self.payload_size as usize) < ORDER_MESSAGE_SIZE {
            return None;
        }
        OrderMessage::decode(&self.payload).ok()
    }

    /// Decode the market-data sub-message if the type tag and declared length allow it
    pub fn market_data_message(&self) -> Option<MarketDataMessage> {
        if self.msg_type != MessageType::MarketData || (self.payload_size as usize) < MARKET_DATA_MESSAGE_SIZE {
            return None;
        }
        MarketDataMessage::decode(&self.payload).ok()
    }
}

// ============================================================================
// Payload Messages
// ============================================================================

/// Encoded size of [`OrderMessage`]
pub const ORDER_MESSAGE_SIZE: usize = 56;
/// Encoded size of [`MarketDataMessage`]
pub const MARKET_DATA_MESSAGE_SIZE: usize = 92;

/// Order carried inside an order-type frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderMessage {
    pub message_id: u64,
    pub timestamp: u64,
    pub symbol: [u8; SYMBOL_LEN],
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub quantity: u32,
    pub price: u64,
    pub client_order_id: u64,
}

impl OrderMessage {
    /// Limit day order with fresh ids and the current timestamp
    pub fn new(symbol: &str, side: Side, quantity: u32, price: u64) -> Self {
        Self {
            message_id: generate_message_id(),
            timestamp: now_nanos(),
            symbol: encode_symbol(symbol),
            side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Day,
            quantity,
            price,
            client_order_id: generate_message_id(),
        }
    }

    pub fn symbol(&self) -> String {
        decode_symbol(&self.symbol)
    }

    pub fn encode(&self) -> [u8; ORDER_MESSAGE_SIZE] {
        let mut buf = [0u8; ORDER_MESSAGE_SIZE];
        let mut w = Writer::new(&mut buf);
        w.u64(self.message_id);
        w.u64(self.timestamp);
        w.put(&self.symbol);
        w.u8(self.side.as_byte());
        w.u8(self.order_type.as_byte());
        w.u8(self.time_in_force.as_byte());
        w.u8(0);
        w.u32(self.quantity);
        w.u64(self.price);
        w.u64(self.client_order_id);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        check_len(buf, ORDER_MESSAGE_SIZE)?;
        let mut r = Reader::new(buf);
        let message_id = r.u64();
        let timestamp = r.u64();
        let symbol = r.take::<SYMBOL_LEN>();
        let side = Side::from_byte(r.u8());
        let order_type = OrderType::from_byte(r.u8());
        let time_in_force = TimeInForce::from_byte(r.u8());
        let _reserved = r.u8();
        Ok(Self {
            message_id,
            timestamp,
            symbol,
            side,
            order_type,
            time_in_force,
            quantity: r.u32(),
            price: r.u64(),
            client_order_id: r.u64(),
        })
    }
}

/// Top-of-book snapshot carried inside a market-data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDataMessage {
    pub message_id: u64,
    pub timestamp: u64,
    pub symbol: [u8; SYMBOL_LEN],
    pub bid_price: u64,
    pub bid_size: u32,
    pub ask_price: u64,
    pub ask_size: u32,
    pub last_price: u64,
    pub last_size: u32,
    pub volume: u64,
    pub high_price: u64,
    pub low_price: u64,
}

impl MarketDataMessage {
    /// Quote with last trade at the midpoint and high/low at ask/bid
    pub fn new(symbol: &str, bid_price: u64, bid_size: u32, ask_price: u64, ask_size: u32) -> Self {
        Self {
            message_id: generate_message_id(),
            timestamp: now_nanos(),
            symbol: encode_symbol(symbol),
            bid_price,
            bid_size,
            ask_price,
            ask_size,
            last_price: bid_price / 2 + ask_price / 2 + (bid_price % 2 + ask_price % 2) / 2,
            last_size: ((bid_size as u64 + ask_size as u64) / 2) as u32,
            volume: rand::thread_rng().gen_range(100..=10_000),
            high_price: ask_price,
            low_price: bid_price,
        }
    }

    pub fn symbol(&self) -> String {
        decode_symbol(&self.symbol)
    }

    pub fn encode(&self) -> [u8; MARKET_DATA_MESSAGE_SIZE] {
        let mut buf = [0u8; MARKET_DATA_MESSAGE_SIZE];
        let mut w = Writer::new(&mut buf);
        w.u64(self.message_id);
        w.u64(self.timestamp);
        w.put(&self.symbol);
        w.u64(self.bid_price);
        w.u32(self.bid_size);
        w.u64(self.ask_price);
        w.u32(self.ask_size);
        w.u64(self.last_price);
        w.u32(self.last_size);
        w.u64(self.volume);
        w.u64(self.high_price);
        w.u64(self.low_price);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        check_len(buf, MARKET_DATA_MESSAGE_SIZE)?;
        let mut r = Reader::new(buf);
        Ok(Self {
            message_id: r.u64(),
            timestamp: r.u64(),
            symbol: r.take(),
            bid_price: r.u64(),
            bid_size: r.u32(),
            ask_price: r.u64(),
            ask_size: r.u32(),
            last_price: r.u64(),
            last_size: r.u32(),
            volume: r.u64(),
            high_price: r.u64(),
            low_price: r.u64(),
        })
    }
}

// ============================================================================
// Ids and Clock
// ============================================================================

/// Generate a random non-zero message id
pub fn generate_message_id() -> u64 {
    rand::thread_rng().gen_range(1..=u64::MAX)
}

/// Wall-clock nanoseconds since the UNIX epoch
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let mut frame = Frame::heartbeat(7);
        frame.id = 0x0102_0304_0506_0708;
        frame.timestamp = 99;
        frame.destination_id = 3;
        let bytes = frame.encode();

        assert_eq!(bytes.len(), FRAME_SIZE);
        assert_eq!(&bytes[0..8], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &99u64.to_le_bytes());
        assert_eq!(bytes[16], 0);
        assert_eq!(bytes[17], 0);
        assert_eq!(&bytes[20..24], &7u32.to_le_bytes());
        assert_eq!(&bytes[24..28], &3u32.to_le_bytes());
        assert_eq!(&bytes[28..32], &0u32.to_le_bytes());
    }

    #[test]
    fn test_decode_short_buffer() {
        let err = Frame::decode(&[0u8; FRAME_SIZE - 1]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Length {
                expected: FRAME_SIZE,
                actual: FRAME_SIZE - 1
            }
        );
    }

    #[test]
    fn test_unknown_type_preserved() {
        let mut bytes = Frame::heartbeat(1).encode();
        bytes[16] = 0xEE;
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.msg_type, MessageType::Unknown(0xEE));
        assert_eq!(frame.encode()[16], 0xEE);
    }

    #[test]
    fn test_order_frame_declares_payload() {
        let order = OrderMessage::new("AAPL", Side::Buy, 100, 150_000);
        let frame = Frame::order(&order, 1);
        assert_eq!(frame.msg_type, MessageType::OrderNew);
        assert_eq!(frame.payload_size as usize, ORDER_MESSAGE_SIZE);
        assert_eq!(frame.order_message(), Some(order));
        assert!(frame.market_data_message().is_none());
    }

    #[test]
    fn test_short_declared_payload_is_not_decoded() {
        let order = OrderMessage::new("AAPL", Side::Sell, 1, 1);
        let mut frame = Frame::order(&order, 1);
        frame.payload_size = (ORDER_MESSAGE_SIZE - 1) as u32;
        assert!(frame.order_message().is_none());
    }

    #[test]
    fn test_symbol_truncated_and_nul_terminated() {
        let raw = encode_symbol("ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert_eq!(raw[SYMBOL_LEN - 1], 0);
        assert_eq!(decode_symbol(&raw), "ABCDEFGHIJKLMNO");
    }

    #[test]
    fn test_market_data_builder() {
        let md = MarketDataMessage::new("MSFT", 149_900, 100, 150_100, 300);
        assert_eq!(md.last_price, 150_000);
        assert_eq!(md.last_size, 200);
        assert_eq!(md.high_price, 150_100);
        assert_eq!(md.low_price, 149_900);
        assert_eq!(md.symbol(), "MSFT");
    }

    #[test]
    fn test_message_ids_non_zero() {
        for _ in 0..1000 {
            assert_ne!(generate_message_id(), 0);
        }
    }
}
