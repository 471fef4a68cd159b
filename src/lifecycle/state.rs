//! 连接阶段定义与转换验证
//! Connection phase definitions and transition validation

/// The phases a connection passes through.
///
/// 连接经历的各个阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    /// 等待加密握手完成
    /// Waiting for the crypto handshake to complete
    AwaitingHandshake,
    /// 握手完成，连接已建立
    /// Handshake complete, the connection is established
    Established,
    /// 正在关闭，连接ID仍被识别以吸收在途流量
    /// Closing, the connection id is still recognized to absorb in-flight traffic
    Closing,
    /// 已关闭，所有状态已清除（终止状态）
    /// Closed, all state purged (terminal)
    Closed,
}

/// Which idle-timeout regime applies.
///
/// 适用哪一种空闲超时规则。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleTimeoutPhase {
    PreHandshake,
    PostHandshake,
}

impl ConnectionPhase {
    /// 验证阶段转换是否合法
    /// Validate if a phase transition is legal
    pub fn is_valid_transition(self, next: ConnectionPhase) -> bool {
        use ConnectionPhase::*;

        match (self, next) {
            // Closed 是终止状态
            // Closed is terminal
            (Closed, _) => false,
            // 从任何其他状态都可以直接转换到Closed（超时中止）
            // Any other state can go straight to Closed (timeout abort)
            (_, Closed) => true,

            (AwaitingHandshake, Established) => true,
            (AwaitingHandshake, Closing) => true,
            (Established, Closing) => true,

            // 同状态转换（幂等）
            // Same phase transition (idempotent)
            (current, next) if current == next => true,

            _ => false,
        }
    }

    /// The idle-timeout regime of this phase, if a timer still runs in it.
    ///
    /// 此阶段的空闲超时规则（若此阶段仍有空闲定时器）。
    pub fn idle_phase(self) -> Option<IdleTimeoutPhase> {
        match self {
            ConnectionPhase::AwaitingHandshake => Some(IdleTimeoutPhase::PreHandshake),
            ConnectionPhase::Established => Some(IdleTimeoutPhase::PostHandshake),
            ConnectionPhase::Closing | ConnectionPhase::Closed => None,
        }
    }

    /// 检查连接ID是否仍被识别
    /// Check if the connection id is still recognized
    pub fn is_recognized(self) -> bool {
        !matches!(self, ConnectionPhase::Closed)
    }

    /// 检查连接是否处于活跃状态
    /// Check if the connection is active
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionPhase::AwaitingHandshake | ConnectionPhase::Established
        )
    }
}
