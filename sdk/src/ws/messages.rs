//! WebSocket message types.
//!
//! Defines the commands sent to the venue, the decoded server frames, and
//! the events delivered to subscribers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{Action, BookView, Ladder, Price, Side};

use super::error::WsError;

/// WebSocket channel types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Market ticker updates.
    Ticker,
    /// Public trades.
    Trade,
    /// Order book snapshots and deltas.
    OrderbookDelta,
    /// Fills on the account's orders.
    Fill,
}

impl Channel {
    /// Returns the wire name of the channel.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Trade => "trade",
            Self::OrderbookDelta => "orderbook_delta",
            Self::Fill => "fill",
        }
    }

    /// Returns true for the sequenced order book channel.
    #[must_use]
    pub const fn is_book(&self) -> bool {
        matches!(self, Self::OrderbookDelta)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = WsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticker" => Ok(Self::Ticker),
            "trade" => Ok(Self::Trade),
            "orderbook_delta" | "orderbook" => Ok(Self::OrderbookDelta),
            "fill" => Ok(Self::Fill),
            other => Err(WsError::InvalidConfig(format!("unknown channel: {}", other))),
        }
    }
}

/// Command verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Subscribe to channels for markets.
    Subscribe,
    /// Cancel subscriptions by server id.
    Unsubscribe,
}

/// Command parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandParams {
    /// Channels to subscribe to.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<Channel>,

    /// Markets to subscribe to.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub market_tickers: Vec<String>,

    /// Server subscription ids to cancel.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sids: Vec<u64>,
}

/// Client-to-server command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientCommand {
    /// Command id, echoed by the server in its reply.
    pub id: u64,

    /// Command verb.
    pub cmd: CommandKind,

    /// Parameters.
    pub params: CommandParams,
}

impl ClientCommand {
    /// Creates a subscribe command for one channel and market.
    #[must_use]
    pub fn subscribe(id: u64, channel: Channel, ticker: impl Into<String>) -> Self {
        Self {
            id,
            cmd: CommandKind::Subscribe,
            params: CommandParams {
                channels: vec![channel],
                market_tickers: vec![ticker.into()],
                ..Default::default()
            },
        }
    }

    /// Creates an unsubscribe command.
    #[must_use]
    pub fn unsubscribe(id: u64, sids: Vec<u64>) -> Self {
        Self {
            id,
            cmd: CommandKind::Unsubscribe,
            params: CommandParams {
                sids,
                ..Default::default()
            },
        }
    }

    /// Serializes the command to JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, WsError> {
        serde_json::to_string(self).map_err(|e| WsError::Serialization(e.to_string()))
    }
}

/// Full order book state for one market.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnapshotMessage {
    /// Server subscription id.
    #[serde(default)]
    pub sid: u64,

    /// Sequence number.
    #[serde(default)]
    pub seq: u64,

    /// Market ticker.
    pub market_ticker: String,

    /// Yes bid ladder.
    #[serde(default, deserialize_with = "ladder_from_levels")]
    pub yes: Ladder,

    /// No bid ladder.
    #[serde(default, deserialize_with = "ladder_from_levels")]
    pub no: Ladder,
}

/// Signed size change at one price level.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeltaMessage {
    /// Server subscription id.
    #[serde(default)]
    pub sid: u64,

    /// Sequence number.
    #[serde(default)]
    pub seq: u64,

    /// Market ticker.
    pub market_ticker: String,

    /// Price level.
    pub price: Price,

    /// Signed change in resting size.
    pub delta: i64,

    /// Book side.
    pub side: Side,
}

/// Market ticker update.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickerMessage {
    /// Server subscription id.
    #[serde(default)]
    pub sid: u64,

    /// Market ticker.
    pub market_ticker: String,

    /// Last traded price.
    #[serde(default)]
    pub price: Option<i64>,

    /// Best yes bid.
    #[serde(default)]
    pub yes_bid: Option<i64>,

    /// Best yes ask.
    #[serde(default)]
    pub yes_ask: Option<i64>,

    /// Contracts traded.
    #[serde(default)]
    pub volume: Option<i64>,

    /// Open interest.
    #[serde(default)]
    pub open_interest: Option<i64>,

    /// Unix timestamp in seconds.
    #[serde(default)]
    pub ts: Option<i64>,
}

/// Public trade.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradeMessage {
    /// Server subscription id.
    #[serde(default)]
    pub sid: u64,

    /// Market ticker.
    pub market_ticker: String,

    /// Trade id.
    #[serde(default)]
    pub trade_id: Option<String>,

    /// Yes price in cents.
    #[serde(default)]
    pub yes_price: Option<i64>,

    /// No price in cents.
    #[serde(default)]
    pub no_price: Option<i64>,

    /// Contracts traded.
    #[serde(default)]
    pub count: Option<i64>,

    /// Side of the taker.
    #[serde(default)]
    pub taker_side: Option<Side>,

    /// Unix timestamp in seconds.
    #[serde(default)]
    pub ts: Option<i64>,
}

/// Fill on one of the account's orders.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FillMessage {
    /// Server subscription id.
    #[serde(default)]
    pub sid: u64,

    /// Market ticker.
    pub market_ticker: String,

    /// Trade id.
    #[serde(default)]
    pub trade_id: Option<String>,

    /// Order id.
    #[serde(default)]
    pub order_id: Option<String>,

    /// Whether the fill took liquidity.
    #[serde(default)]
    pub is_taker: Option<bool>,

    /// Contract side.
    #[serde(default)]
    pub side: Option<Side>,

    /// Order action.
    #[serde(default)]
    pub action: Option<Action>,

    /// Yes price in cents.
    #[serde(default)]
    pub yes_price: Option<i64>,

    /// No price in cents.
    #[serde(default)]
    pub no_price: Option<i64>,

    /// Contracts filled.
    #[serde(default)]
    pub count: Option<i64>,

    /// Unix timestamp in seconds.
    #[serde(default)]
    pub ts: Option<i64>,
}

/// Server-to-client messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Subscription confirmed.
    Subscribed {
        /// Command id being answered.
        id: Option<u64>,
        /// Assigned server subscription id.
        sid: u64,
        /// Channel name as reported by the server.
        channel: Option<String>,
    },
    /// Unsubscription confirmed.
    Unsubscribed {
        /// Command id being answered.
        id: Option<u64>,
        /// Cancelled server subscription id.
        sid: u64,
    },
    /// Generic acknowledgement.
    Ok {
        /// Command id being answered.
        id: Option<u64>,
    },
    /// Order book snapshot.
    OrderbookSnapshot(SnapshotMessage),
    /// Order book delta.
    OrderbookDelta(DeltaMessage),
    /// Ticker update.
    Ticker(TickerMessage),
    /// Public trade.
    Trade(TradeMessage),
    /// Account fill.
    Fill(FillMessage),
    /// Error reply.
    Error {
        /// Command id being answered.
        id: Option<u64>,
        /// Error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// Pong frame.
    HeartbeatAck,
    /// Message type this client does not know.
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    sid: Option<u64>,
    #[serde(default)]
    seq: Option<u64>,
    #[serde(default)]
    msg: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionBody {
    #[serde(default)]
    sid: Option<u64>,
    #[serde(default)]
    channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

fn body<T: DeserializeOwned>(kind: &str, msg: serde_json::Value) -> Result<T, WsError> {
    serde_json::from_value(msg).map_err(|e| WsError::Deserialization(format!("{}: {}", kind, e)))
}

fn optional_body<T: DeserializeOwned + Default>(msg: serde_json::Value) -> T {
    if msg.is_null() {
        T::default()
    } else {
        serde_json::from_value(msg).unwrap_or_default()
    }
}

impl ServerMessage {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns `WsError::Deserialization` if the frame is not a valid
    /// envelope or a known message body is malformed.
    pub fn decode(text: &str) -> Result<Self, WsError> {
        let env: Envelope =
            serde_json::from_str(text).map_err(|e| WsError::Deserialization(e.to_string()))?;
        let sid = env.sid.unwrap_or_default();
        let seq = env.seq.unwrap_or_default();

        let message = match env.kind.as_str() {
            "subscribed" => {
                let b: SubscriptionBody = optional_body(env.msg);
                let sid = b.sid.or(env.sid).ok_or_else(|| {
                    WsError::Deserialization("subscribed: missing sid".to_string())
                })?;
                Self::Subscribed {
                    id: env.id,
                    sid,
                    channel: b.channel,
                }
            }
            "unsubscribed" => {
                let b: SubscriptionBody = optional_body(env.msg);
                let sid = env.sid.or(b.sid).ok_or_else(|| {
                    WsError::Deserialization("unsubscribed: missing sid".to_string())
                })?;
                Self::Unsubscribed { id: env.id, sid }
            }
            "ok" => Self::Ok { id: env.id },
            "orderbook_snapshot" => {
                let mut m: SnapshotMessage = body(&env.kind, env.msg)?;
                m.sid = sid;
                m.seq = seq;
                Self::OrderbookSnapshot(m)
            }
            "orderbook_delta" => {
                let mut m: DeltaMessage = body(&env.kind, env.msg)?;
                m.sid = sid;
                m.seq = seq;
                Self::OrderbookDelta(m)
            }
            "ticker" | "ticker_v2" => {
                let mut m: TickerMessage = body(&env.kind, env.msg)?;
                m.sid = sid;
                Self::Ticker(m)
            }
            "trade" => {
                let mut m: TradeMessage = body(&env.kind, env.msg)?;
                m.sid = sid;
                Self::Trade(m)
            }
            "fill" => {
                let mut m: FillMessage = body(&env.kind, env.msg)?;
                m.sid = sid;
                Self::Fill(m)
            }
            "error" => {
                let b: ErrorBody = optional_body(env.msg);
                Self::Error {
                    id: env.id,
                    code: b.code,
                    message: b.msg,
                }
            }
            other => Self::Unknown(other.to_string()),
        };

        Ok(message)
    }

    /// Returns the channel a data message belongs to.
    #[must_use]
    pub fn channel(&self) -> Option<Channel> {
        match self {
            Self::OrderbookSnapshot(_) | Self::OrderbookDelta(_) => Some(Channel::OrderbookDelta),
            Self::Ticker(_) => Some(Channel::Ticker),
            Self::Trade(_) => Some(Channel::Trade),
            Self::Fill(_) => Some(Channel::Fill),
            _ => None,
        }
    }

    /// Returns the market a data message belongs to.
    #[must_use]
    pub fn ticker(&self) -> Option<&str> {
        match self {
            Self::OrderbookSnapshot(m) => Some(&m.market_ticker),
            Self::OrderbookDelta(m) => Some(&m.market_ticker),
            Self::Ticker(m) => Some(&m.market_ticker),
            Self::Trade(m) => Some(&m.market_ticker),
            Self::Fill(m) => Some(&m.market_ticker),
            _ => None,
        }
    }

    /// Returns the server subscription id of a data message.
    #[must_use]
    pub fn sid(&self) -> Option<u64> {
        match self {
            Self::OrderbookSnapshot(m) => Some(m.sid),
            Self::OrderbookDelta(m) => Some(m.sid),
            Self::Ticker(m) => Some(m.sid),
            Self::Trade(m) => Some(m.sid),
            Self::Fill(m) => Some(m.sid),
            _ => None,
        }
    }
}

/// Event delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Book was rebuilt from a snapshot.
    Snapshot(BookView),
    /// A delta was applied; carries the change and the resulting book.
    Delta {
        /// The applied change.
        delta: DeltaMessage,
        /// Book after the change.
        book: BookView,
    },
    /// Ticker update.
    Ticker(TickerMessage),
    /// Public trade.
    Trade(TradeMessage),
    /// Account fill.
    Fill(FillMessage),
    /// The server refused the subscription.
    Error {
        /// Error code.
        code: i64,
        /// Error message.
        message: String,
    },
}

fn ladder_from_levels<'de, D>(deserializer: D) -> Result<Ladder, D::Error>
where
    D: Deserializer<'de>,
{
    let levels: Option<Vec<[i64; 2]>> = Option::deserialize(deserializer)?;
    let mut ladder = Ladder::new();
    for [price, size] in levels.unwrap_or_default() {
        let price = Price::new(price).map_err(serde::de::Error::custom)?;
        if size < 0 {
            return Err(serde::de::Error::custom(format!("negative size {} at {}", size, price)));
        }
        if size > 0 {
            ladder.insert(price, size as u64);
        }
    }
    Ok(ladder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(cents: i64) -> Price {
        Price::new(cents).expect("valid price")
    }

    #[test]
    fn test_channel_display() {
        assert_eq!(Channel::Ticker.to_string(), "ticker");
        assert_eq!(Channel::Trade.to_string(), "trade");
        assert_eq!(Channel::OrderbookDelta.to_string(), "orderbook_delta");
        assert_eq!(Channel::Fill.to_string(), "fill");
        assert_eq!("fill".parse::<Channel>().expect("parse"), Channel::Fill);
        assert!("book".parse::<Channel>().is_err());
    }

    #[test]
    fn test_subscribe_command_serialize() {
        let cmd = ClientCommand::subscribe(3, Channel::OrderbookDelta, "KXBTC-25JAN");
        let json = cmd.to_json().expect("serialize");
        assert_eq!(
            json,
            r#"{"id":3,"cmd":"subscribe","params":{"channels":["orderbook_delta"],"market_tickers":["KXBTC-25JAN"]}}"#
        );
    }

    #[test]
    fn test_unsubscribe_command_serialize() {
        let cmd = ClientCommand::unsubscribe(4, vec![7]);
        let json = cmd.to_json().expect("serialize");
        assert_eq!(json, r#"{"id":4,"cmd":"unsubscribe","params":{"sids":[7]}}"#);
    }

    #[test]
    fn test_decode_subscribed() {
        let text = r#"{"id":1,"type":"subscribed","msg":{"channel":"orderbook_delta","sid":5}}"#;
        let msg = ServerMessage::decode(text).expect("decode");
        assert_eq!(
            msg,
            ServerMessage::Subscribed {
                id: Some(1),
                sid: 5,
                channel: Some("orderbook_delta".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_unsubscribed_without_body() {
        let msg = ServerMessage::decode(r#"{"id":2,"sid":5,"type":"unsubscribed"}"#).expect("decode");
        assert_eq!(msg, ServerMessage::Unsubscribed { id: Some(2), sid: 5 });
    }

    #[test]
    fn test_decode_snapshot() {
        let text = r#"{"type":"orderbook_snapshot","sid":2,"seq":100,
            "msg":{"market_ticker":"MKT","yes":[[45,10],[30,0]],"no":[[55,20]]}}"#;
        match ServerMessage::decode(text).expect("decode") {
            ServerMessage::OrderbookSnapshot(m) => {
                assert_eq!(m.sid, 2);
                assert_eq!(m.seq, 100);
                assert_eq!(m.yes.get(&price(45)), Some(&10));
                assert!(!m.yes.contains_key(&price(30)));
                assert_eq!(m.no.get(&price(55)), Some(&20));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_snapshot_with_missing_side() {
        let text = r#"{"type":"orderbook_snapshot","sid":2,"seq":1,"msg":{"market_ticker":"MKT","no":[[55,20]]}}"#;
        match ServerMessage::decode(text).expect("decode") {
            ServerMessage::OrderbookSnapshot(m) => assert!(m.yes.is_empty()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_snapshot_rejects_out_of_domain_price() {
        let text = r#"{"type":"orderbook_snapshot","sid":2,"seq":1,"msg":{"market_ticker":"MKT","yes":[[100,5]]}}"#;
        assert!(ServerMessage::decode(text).is_err());
    }

    #[test]
    fn test_decode_delta() {
        let text = r#"{"type":"orderbook_delta","sid":2,"seq":101,
            "msg":{"market_ticker":"MKT","price":45,"delta":-5,"side":"yes"}}"#;
        let msg = ServerMessage::decode(text).expect("decode");
        assert_eq!(msg.channel(), Some(Channel::OrderbookDelta));
        assert_eq!(msg.ticker(), Some("MKT"));
        match msg {
            ServerMessage::OrderbookDelta(m) => {
                assert_eq!(m.seq, 101);
                assert_eq!(m.price, price(45));
                assert_eq!(m.delta, -5);
                assert_eq!(m.side, Side::Yes);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_error() {
        let text = r#"{"id":9,"type":"error","msg":{"code":6,"msg":"Already subscribed"}}"#;
        assert_eq!(
            ServerMessage::decode(text).expect("decode"),
            ServerMessage::Error {
                id: Some(9),
                code: 6,
                message: "Already subscribed".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_trade_and_fill() {
        let trade = r#"{"type":"trade","sid":3,"msg":{"market_ticker":"MKT","trade_id":"t1","yes_price":36,"no_price":64,"count":136,"taker_side":"no","ts":1669149841}}"#;
        match ServerMessage::decode(trade).expect("decode") {
            ServerMessage::Trade(m) => {
                assert_eq!(m.sid, 3);
                assert_eq!(m.taker_side, Some(Side::No));
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let fill = r#"{"type":"fill","sid":4,"msg":{"market_ticker":"MKT","order_id":"o1","side":"yes","action":"buy","yes_price":75,"count":278,"is_taker":true}}"#;
        match ServerMessage::decode(fill).expect("decode") {
            ServerMessage::Fill(m) => {
                assert_eq!(m.order_id.as_deref(), Some("o1"));
                assert_eq!(m.action, Some(Action::Buy));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_type() {
        let msg = ServerMessage::decode(r#"{"type":"market_lifecycle","msg":{}}"#).expect("decode");
        assert_eq!(msg, ServerMessage::Unknown("market_lifecycle".to_string()));
        assert!(msg.ticker().is_none());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(ServerMessage::decode("not json").is_err());
        assert!(ServerMessage::decode(r#"{"msg":{}}"#).is_err());
    }
}
