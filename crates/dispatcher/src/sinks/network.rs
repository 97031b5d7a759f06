//! UDP publisher: one datagram per emitted estimate

use std::collections::HashMap;
use std::net::SocketAddr;

use contracts::{ContractError, DataSink, DelayStatus, LiveDelayFrame};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::{debug, instrument, warn};

/// Largest payload we put in a single datagram
const DEFAULT_MAX_DATAGRAM: usize = 65_000;

/// Fixed-layout estimate for bincode datagrams. Bincode cannot skip
/// fields, so `points` is always present here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BincodeEstimate {
    pub frame_id: u64,
    pub timestamp: f64,
    pub valid: bool,
    pub status: DelayStatus,
    pub lateral_delay: f64,
    pub lateral_delay_estimate: f64,
    pub valid_blocks: usize,
    pub points: Option<Vec<f64>>,
}

impl From<&LiveDelayFrame> for BincodeEstimate {
    fn from(frame: &LiveDelayFrame) -> Self {
        let delay = &frame.live_delay;
        Self {
            frame_id: frame.frame_id,
            timestamp: frame.timestamp,
            valid: delay.valid,
            status: delay.status,
            lateral_delay: delay.lateral_delay,
            lateral_delay_estimate: delay.lateral_delay_estimate,
            valid_blocks: delay.valid_blocks,
            points: delay.points.clone(),
        }
    }
}

/// Wire encoding of a published estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    #[default]
    Json,
    Bincode,
}

impl NetworkFormat {
    fn parse(value: Option<&str>) -> Result<Self, String> {
        match value {
            None | Some("json") => Ok(Self::Json),
            Some("bincode") => Ok(Self::Bincode),
            Some(other) => Err(format!("unknown format '{other}' (expected json or bincode)")),
        }
    }

    fn encode(self, frame: &LiveDelayFrame) -> Result<Vec<u8>, String> {
        match self {
            Self::Json => serde_json::to_vec(frame).map_err(|e| e.to_string()),
            Self::Bincode => {
                bincode::serialize(&BincodeEstimate::from(frame)).map_err(|e| e.to_string())
            }
        }
    }
}

/// Where and how a `NetworkSink` publishes
///
/// Sink params: `addr` (required), `format` (`json` | `bincode`),
/// `max_packet_size` (bytes).
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    pub addr: SocketAddr,
    pub format: NetworkFormat,
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            format: NetworkFormat::default(),
            max_packet_size: DEFAULT_MAX_DATAGRAM,
        }
    }

    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let raw_addr = params.get("addr").ok_or("missing 'addr' parameter")?;
        let addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|e| format!("invalid address '{raw_addr}': {e}"))?;
        let format = NetworkFormat::parse(params.get("format").map(String::as_str))?;
        let max_packet_size = match params.get("max_packet_size") {
            None => DEFAULT_MAX_DATAGRAM,
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| format!("invalid max_packet_size '{raw}'"))?,
        };

        Ok(Self {
            addr,
            format,
            max_packet_size,
        })
    }
}

/// Publishes estimates to a fixed UDP peer. Delivery is best effort: a
/// failed send is logged, not reported as a sink failure.
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: Option<UdpSocket>,
    sent: u64,
}

impl NetworkSink {
    #[instrument(name = "network_sink_new", skip(name, config), fields(target = %config.addr))]
    pub async fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let local: SocketAddr = if config.addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(config.addr).await?;
        debug!(sink = %name, target = %config.addr, format = ?config.format, "Publishing estimates over UDP");

        Ok(Self {
            name,
            config,
            socket: Some(socket),
            sent: 0,
        })
    }

    #[instrument(name = "network_sink_from_params", skip(name, params))]
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|message| ContractError::sink_write(&name, message))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::SinkConnection {
                sink_name: name,
                message: e.to_string(),
            })
    }

    /// Datagrams handed to the socket so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    fn datagram(&self, frame: &LiveDelayFrame) -> Result<Vec<u8>, ContractError> {
        let payload = self
            .config
            .format
            .encode(frame)
            .map_err(|e| ContractError::sink_write(&self.name, e))?;
        if payload.len() > self.config.max_packet_size {
            return Err(ContractError::sink_write(
                &self.name,
                format!(
                    "estimate {} encodes to {} bytes, over the {} byte limit",
                    frame.frame_id,
                    payload.len(),
                    self.config.max_packet_size
                ),
            ));
        }
        Ok(payload)
    }
}

impl DataSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_write",
        skip(self, frame),
        fields(sink = %self.name, frame_id = frame.frame_id)
    )]
    async fn write(&mut self, frame: &LiveDelayFrame) -> Result<(), ContractError> {
        let payload = self.datagram(frame)?;
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "sink already closed"))?;

        match socket.send(&payload).await {
            Ok(bytes) => {
                self.sent += 1;
                debug!(sink = %self.name, bytes, "Estimate published");
            }
            Err(e) => warn!(sink = %self.name, error = %e, "UDP send failed"),
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if self.socket.take().is_some() {
            debug!(sink = %self.name, sent = self.sent, "NetworkSink closed");
        }
        Ok(())
    }
}
