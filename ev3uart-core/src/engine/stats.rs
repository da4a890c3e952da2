//! Link health counters

/// Error and traffic counters
///
/// `consecutive_errors` drives the recovery policy. Everything else is
/// diagnostic only and never influences decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    /// Streaming checksum failures this session
    pub data_errors: u32,
    /// Streaming checksum failures since the last good DATA message
    pub consecutive_errors: u8,
    /// DATA messages accepted this session
    pub messages_received: u32,
    /// Handshake messages dropped for a bad checksum
    pub handshake_errors: u32,
    /// Messages dropped for a bad length, unknown mode or read timeout
    pub malformed_frames: u32,
    /// Transport failures seen inside `service()`
    pub transport_errors: u32,
    /// Automatic resets since the engine was created
    pub resets: u32,
}

impl LinkStats {
    /// Record a good DATA message
    pub fn record_data(&mut self) {
        self.consecutive_errors = 0;
        self.messages_received = self.messages_received.wrapping_add(1);
    }

    /// Record a DATA checksum failure
    ///
    /// Returns true when `threshold` consecutive failures have been reached.
    pub fn record_data_error(&mut self, threshold: u8) -> bool {
        self.data_errors = self.data_errors.saturating_add(1);
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.consecutive_errors >= threshold
    }

    /// Clear the streaming counters when a session starts
    pub fn start_streaming(&mut self) {
        self.data_errors = 0;
        self.consecutive_errors = 0;
        self.messages_received = 0;
    }

    /// Clear every per-session counter, keeping the lifetime reset count
    pub fn clear_session(&mut self) {
        *self = Self {
            resets: self.resets,
            ..Self::default()
        };
    }
}
