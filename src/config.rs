//! 定义了协议的参数注册表。
//! Defines the protocol's parameter registry.
//!
//! Every bound and default the governance layer enforces lives here. The
//! protocol values are exported as constants and used by the `Default`
//! implementations; a `Config` is then injected into each component so tests
//! can substitute alternate bounds.
//!
//! 治理层执行的每一个边界和默认值都在这里定义。协议值以常量形式导出，
//! 并由 `Default` 实现使用；随后 `Config` 被注入到各组件中，以便测试可以替换边界。

use crate::error::{Error, Result};
use crate::types::{ByteCount, PacketNumber};
use std::time::Duration;

/// Default upper bound of the congestion window, in packets.
pub const DEFAULT_MAX_CONGESTION_WINDOW: u32 = 1000;
/// Initial congestion window, in packets.
pub const INITIAL_CONGESTION_WINDOW: u32 = 32;
/// Lower bound the congestion window never shrinks below, in packets.
pub const MIN_CONGESTION_WINDOW: u32 = 2;

/// Undecryptable packets queued before the session gives up on them.
pub const MAX_UNDECRYPTABLE_PACKETS: usize = 10;
/// Packets queued per session that are not yet processed.
pub const MAX_SESSION_UNPROCESSED_PACKETS: usize = DEFAULT_MAX_CONGESTION_WINDOW as usize;

/// Maximum delay applied to an ACK for a retransmittable packet.
pub const ACK_SEND_DELAY: Duration = Duration::from_millis(25);
/// Packets received before an ACK is sent regardless of delay.
pub const MAX_PACKETS_RECEIVED_BEFORE_ACK_SEND: u32 = 20;
/// Retransmittable packets received before an ACK is sent.
pub const RETRANSMITTABLE_PACKETS_BEFORE_ACK: u32 = 2;

/// Stream-level receive window.
pub const RECEIVE_STREAM_FLOW_CONTROL_WINDOW: ByteCount = 32 * (1 << 10);
/// Connection-level receive window.
pub const RECEIVE_CONNECTION_FLOW_CONTROL_WINDOW: ByteCount = 48 * (1 << 10);
/// Largest stream-level receive window auto-tuning may reach.
pub const MAX_RECEIVE_STREAM_FLOW_CONTROL_WINDOW: ByteCount = 1 << 20;
/// Largest connection-level receive window auto-tuning may reach.
pub const MAX_RECEIVE_CONNECTION_FLOW_CONTROL_WINDOW: ByteCount = 3 * (1 << 19);
/// The connection window is kept at least this multiple of any tuned stream window.
pub const CONNECTION_FLOW_CONTROL_MULTIPLIER: f64 = 1.5;

/// Maximum number of streams per connection.
pub const MAX_STREAMS_PER_CONNECTION: u32 = 100;
/// Maximum number of incoming dynamic streams per connection.
pub const MAX_INCOMING_DYNAMIC_STREAMS_PER_CONNECTION: u32 = 100;
/// Proportional slack granted on top of the stream limit.
pub const MAX_STREAMS_MULTIPLIER: f64 = 1.1;
/// Absolute slack granted on top of the stream limit.
pub const MAX_STREAMS_MINIMUM_INCREMENT: u32 = 10;
/// Hard ceiling of the advertised stream limit: the incoming limit plus its slack.
pub const MAX_STREAMS_ABSOLUTE: u32 =
    MAX_INCOMING_DYNAMIC_STREAMS_PER_CONNECTION + MAX_STREAMS_MINIMUM_INCREMENT;
/// Maximum distance between a new stream id and the highest id ever opened.
/// Only every other id belongs to one side, so this admits half as many streams.
pub const MAX_NEW_STREAM_ID_DELTA: u32 = 4 * MAX_STREAMS_PER_CONNECTION;
/// Maximum number of gaps between received stream frames.
pub const MAX_STREAM_FRAME_SORTER_GAPS: usize = 1000;

/// A packet is retransmitted once it has been NACKed more often than this.
pub const RETRANSMISSION_THRESHOLD: u32 = 3;
/// Average distance between two skipped packet numbers.
pub const SKIP_PACKET_AVERAGE_PERIOD_LENGTH: PacketNumber = 500;
/// Smallest distance between two skipped packet numbers.
pub const SKIP_PACKET_MIN_GAP: PacketNumber = 2;
/// Skipped packet numbers remembered for optimistic ACK detection.
pub const MAX_TRACKED_SKIPPED_PACKETS: usize = 10;
/// Sent packets tracked for retransmission.
pub const MAX_TRACKED_SENT_PACKETS: usize = 2 * DEFAULT_MAX_CONGESTION_WINDOW as usize;
/// Distance below the largest received packet that is still tracked.
pub const MAX_TRACKED_RECEIVED_PACKETS: u64 = 2 * DEFAULT_MAX_CONGESTION_WINDOW as u64;
/// Received ACK ranges tracked.
pub const MAX_TRACKED_RECEIVED_ACK_RANGES: usize = DEFAULT_MAX_CONGESTION_WINDOW as usize;

/// Upper limit for the number of parameters in a crypto message.
pub const CRYPTO_MAX_PARAMS: usize = 128;
/// Upper limit for the length of a single crypto message parameter.
pub const CRYPTO_PARAMETER_MAX_LENGTH: usize = 2000;
/// Lifetime of the ephemeral key exchange key.
pub const EPHEMERAL_KEY_LIFETIME: Duration = Duration::from_secs(60);
/// Validity of a source address token.
pub const STK_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

/// Idle timeout before the handshake succeeds.
pub const INITIAL_IDLE_TIMEOUT: Duration = Duration::from_secs(5);
/// Idle timeout after the handshake when the peer does not specify one.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest idle timeout that can be negotiated.
pub const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Deadline for the crypto handshake, measured from connection creation.
pub const MAX_TIME_FOR_CRYPTO_HANDSHAKE: Duration = Duration::from_secs(10);
/// Time a closed connection is still recognized before its state is deleted.
pub const CLOSED_SESSION_DELETE_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of cached compressed certificate chains, each about 1 KiB.
pub const NUM_CACHED_CERTIFICATES: usize = 128;

/// A structure containing every bound the governance layer enforces.
///
/// 包含治理层执行的所有边界的结构体。
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Congestion window bounds.
    /// 拥塞窗口边界。
    pub congestion: CongestionConfig,

    /// Flow-control windows.
    /// 流量控制窗口。
    pub flow_control: FlowControlConfig,

    /// Stream admission limits.
    /// 流准入限制。
    pub streams: StreamConfig,

    /// Loss detection and optimistic ACK mitigation.
    /// 丢包检测与乐观ACK攻击缓解。
    pub reliability: ReliabilityConfig,

    /// ACK cadence.
    /// ACK 发送节奏。
    pub ack: AckConfig,

    /// Handshake message bounds and key lifetimes.
    /// 握手消息边界与密钥生命周期。
    pub crypto: CryptoConfig,

    /// Idle, handshake and deletion timeouts.
    /// 空闲、握手与删除超时。
    pub timeouts: TimeoutConfig,

    /// Per-connection queue bounds.
    /// 每个连接的队列边界。
    pub connection: ConnectionConfig,

    /// Process-wide certificate cache.
    /// 进程级证书缓存。
    pub cache: CacheConfig,
}

/// Congestion window bounds, in packets.
///
/// 拥塞窗口边界（以包为单位）。
#[derive(Debug, Clone)]
pub struct CongestionConfig {
    pub initial_window_packets: u32,
    pub max_window_packets: u32,
    pub min_window_packets: u32,
}

/// Flow-control windows, in bytes.
///
/// 流量控制窗口（以字节为单位）。
#[derive(Debug, Clone)]
pub struct FlowControlConfig {
    /// The stream-level receive window a new stream opens with.
    /// 新流打开时的流级接收窗口。
    pub stream_receive_window: ByteCount,
    /// The connection-level receive window a new connection opens with.
    /// 新连接打开时的连接级接收窗口。
    pub connection_receive_window: ByteCount,
    /// Absolute maximum of any stream-level window.
    /// 任何流级窗口的绝对上限。
    pub max_stream_receive_window: ByteCount,
    /// Absolute maximum of the connection-level window.
    /// 连接级窗口的绝对上限。
    pub max_connection_receive_window: ByteCount,
    /// After a stream window is tuned, the connection window is raised to at
    /// least this multiple of it.
    /// 流窗口被调整后，连接窗口至少提升到它的该倍数。
    pub connection_window_multiplier: f64,
}

/// Stream admission limits.
///
/// 流准入限制。
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub max_streams_per_connection: u32,
    /// The stream limit advertised when a connection opens.
    /// 连接打开时通告的流限制。
    pub max_incoming_dynamic_streams: u32,
    pub max_streams_multiplier: f64,
    pub max_streams_minimum_increment: u32,
    /// The advertised limit never grows past this.
    /// 通告的限制永远不会超过此值。
    pub max_streams_absolute: u32,
    pub max_new_stream_id_delta: u32,
    pub max_stream_frame_sorter_gaps: usize,
}

/// Loss detection and optimistic ACK mitigation.
///
/// 丢包检测与乐观ACK攻击缓解参数。
#[derive(Debug, Clone)]
pub struct ReliabilityConfig {
    /// A packet must be NACKed `retransmission_threshold + 1` times before it
    /// is retransmitted.
    /// 一个包必须被NACK `retransmission_threshold + 1` 次后才会被重传。
    pub retransmission_threshold: u32,
    pub max_tracked_sent_packets: usize,
    pub max_tracked_received_packets: u64,
    pub max_tracked_received_ack_ranges: usize,
    /// Average distance between two skipped packet numbers.
    /// 两个被跳过的包号之间的平均距离。
    pub skip_packet_average_period: PacketNumber,
    /// Two skipped packet numbers are never closer than this.
    /// 两个被跳过的包号之间的距离永远不小于此值。
    pub skip_packet_min_gap: PacketNumber,
    pub max_tracked_skipped_packets: usize,
}

/// ACK cadence.
///
/// ACK 发送节奏参数。
#[derive(Debug, Clone)]
pub struct AckConfig {
    pub ack_send_delay: Duration,
    pub max_packets_received_before_ack: u32,
    pub retransmittable_packets_before_ack: u32,
}

/// Handshake message bounds and key lifetimes.
#[derive(Debug, Clone)]
pub struct CryptoConfig {
    pub crypto_max_params: usize,
    pub crypto_parameter_max_length: usize,
    pub ephemeral_key_lifetime: Duration,
    pub stk_expiry: Duration,
}

/// Idle, handshake and deletion timeouts.
///
/// 空闲、握手与删除超时。
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// The idle timeout before the handshake completes.
    /// 握手完成前的空闲超时。
    pub initial_idle_timeout: Duration,
    /// The idle timeout after the handshake when none was negotiated. Also
    /// the lower bound of any negotiated value.
    /// 握手后未协商时的空闲超时，也是任何协商值的下限。
    pub default_idle_timeout: Duration,
    /// Negotiated idle timeouts above this are rejected.
    /// 高于此值的协商空闲超时将被拒绝。
    pub max_idle_timeout: Duration,
    pub max_time_for_crypto_handshake: Duration,
    /// A closing connection is still recognized for this long.
    /// 正在关闭的连接在此期间内仍可被识别。
    pub closed_session_delete_timeout: Duration,
}

/// Per-connection queue bounds.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub max_undecryptable_packets: usize,
    /// Capacity of the command channel feeding a connection's actor.
    /// 连接actor命令通道的容量。
    pub max_session_unprocessed_packets: usize,
}

/// Process-wide certificate cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub num_cached_certificates: usize,
}

impl Config {
    /// Checks that a substituted configuration is internally consistent.
    ///
    /// 检查替换后的配置是否内部一致。
    pub fn validate(&self) -> Result<()> {
        let cc = &self.congestion;
        if cc.min_window_packets == 0 || cc.min_window_packets > cc.initial_window_packets {
            return Err(Error::InvalidConfig(
                "congestion window minimum must be in 1..=initial",
            ));
        }
        if cc.initial_window_packets > cc.max_window_packets {
            return Err(Error::InvalidConfig(
                "initial congestion window exceeds its maximum",
            ));
        }

        let fc = &self.flow_control;
        if fc.stream_receive_window > fc.max_stream_receive_window {
            return Err(Error::InvalidConfig(
                "stream receive window exceeds its maximum",
            ));
        }
        if fc.connection_receive_window > fc.max_connection_receive_window {
            return Err(Error::InvalidConfig(
                "connection receive window exceeds its maximum",
            ));
        }
        if fc.connection_window_multiplier < 1.0 {
            return Err(Error::InvalidConfig(
                "connection window multiplier must be at least 1",
            ));
        }

        let streams = &self.streams;
        if streams.max_incoming_dynamic_streams > streams.max_streams_absolute {
            return Err(Error::InvalidConfig(
                "initial stream limit exceeds the absolute maximum",
            ));
        }
        if streams.max_streams_multiplier < 1.0 {
            return Err(Error::InvalidConfig(
                "stream limit multiplier must be at least 1",
            ));
        }

        let rel = &self.reliability;
        if rel.max_tracked_sent_packets == 0
            || rel.max_tracked_received_ack_ranges == 0
            || rel.max_tracked_skipped_packets == 0
        {
            return Err(Error::InvalidConfig("tracking bounds must be non-zero"));
        }
        if rel.skip_packet_min_gap == 0
            || rel.skip_packet_min_gap > rel.skip_packet_average_period
        {
            return Err(Error::InvalidConfig(
                "skip gap must be in 1..=average skip period",
            ));
        }

        let to = &self.timeouts;
        if to.default_idle_timeout > to.max_idle_timeout {
            return Err(Error::InvalidConfig(
                "default idle timeout exceeds the maximum",
            ));
        }

        if self.connection.max_session_unprocessed_packets == 0 {
            return Err(Error::InvalidConfig(
                "session queue capacity must be non-zero",
            ));
        }
        if self.cache.num_cached_certificates == 0 {
            return Err(Error::InvalidConfig(
                "certificate cache capacity must be non-zero",
            ));
        }
        Ok(())
    }
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            initial_window_packets: INITIAL_CONGESTION_WINDOW,
            max_window_packets: DEFAULT_MAX_CONGESTION_WINDOW,
            min_window_packets: MIN_CONGESTION_WINDOW,
        }
    }
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        Self {
            stream_receive_window: RECEIVE_STREAM_FLOW_CONTROL_WINDOW,
            connection_receive_window: RECEIVE_CONNECTION_FLOW_CONTROL_WINDOW,
            max_stream_receive_window: MAX_RECEIVE_STREAM_FLOW_CONTROL_WINDOW,
            max_connection_receive_window: MAX_RECEIVE_CONNECTION_FLOW_CONTROL_WINDOW,
            connection_window_multiplier: CONNECTION_FLOW_CONTROL_MULTIPLIER,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_streams_per_connection: MAX_STREAMS_PER_CONNECTION,
            max_incoming_dynamic_streams: MAX_INCOMING_DYNAMIC_STREAMS_PER_CONNECTION,
            max_streams_multiplier: MAX_STREAMS_MULTIPLIER,
            max_streams_minimum_increment: MAX_STREAMS_MINIMUM_INCREMENT,
            max_streams_absolute: MAX_STREAMS_ABSOLUTE,
            max_new_stream_id_delta: MAX_NEW_STREAM_ID_DELTA,
            max_stream_frame_sorter_gaps: MAX_STREAM_FRAME_SORTER_GAPS,
        }
    }
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            retransmission_threshold: RETRANSMISSION_THRESHOLD,
            max_tracked_sent_packets: MAX_TRACKED_SENT_PACKETS,
            max_tracked_received_packets: MAX_TRACKED_RECEIVED_PACKETS,
            max_tracked_received_ack_ranges: MAX_TRACKED_RECEIVED_ACK_RANGES,
            skip_packet_average_period: SKIP_PACKET_AVERAGE_PERIOD_LENGTH,
            skip_packet_min_gap: SKIP_PACKET_MIN_GAP,
            max_tracked_skipped_packets: MAX_TRACKED_SKIPPED_PACKETS,
        }
    }
}

impl Default for AckConfig {
    fn default() -> Self {
        Self {
            ack_send_delay: ACK_SEND_DELAY,
            max_packets_received_before_ack: MAX_PACKETS_RECEIVED_BEFORE_ACK_SEND,
            retransmittable_packets_before_ack: RETRANSMITTABLE_PACKETS_BEFORE_ACK,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            crypto_max_params: CRYPTO_MAX_PARAMS,
            crypto_parameter_max_length: CRYPTO_PARAMETER_MAX_LENGTH,
            ephemeral_key_lifetime: EPHEMERAL_KEY_LIFETIME,
            stk_expiry: STK_EXPIRY,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            initial_idle_timeout: INITIAL_IDLE_TIMEOUT,
            default_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_idle_timeout: MAX_IDLE_TIMEOUT,
            max_time_for_crypto_handshake: MAX_TIME_FOR_CRYPTO_HANDSHAKE,
            closed_session_delete_timeout: CLOSED_SESSION_DELETE_TIMEOUT,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_undecryptable_packets: MAX_UNDECRYPTABLE_PACKETS,
            max_session_unprocessed_packets: MAX_SESSION_UNPROCESSED_PACKETS,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            num_cached_certificates: NUM_CACHED_CERTIFICATES,
        }
    }
}
