//! gpsd position source.
//!
//! Talks the gpsd JSON protocol over TCP: after connecting we send a
//! `?WATCH` command and read one JSON object per line. Only `TPV`
//! (time-position-velocity) reports with a 2D or 3D fix become positions;
//! every other report class is ignored. Requests asking for high accuracy
//! only accept 3D fixes.
//!
//! gpsd has no permission model, so permission is always granted. A lost
//! connection is reported to subscribers as `PositionUnavailable` and the
//! subscription reconnects after [`RECONNECT_DELAY`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::source::{
    PositionRequest, PositionSource, PositionStream, SourceError, SourceResult, STREAM_CAPACITY,
};
use crate::types::{PermissionStatus, Position};

/// Delay before a dropped gpsd connection is retried.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// Report classes we care about. Everything else falls into `Other`.
#[derive(Debug, Deserialize)]
#[serde(tag = "class")]
enum Report {
    #[serde(rename = "TPV")]
    Tpv(TpvReport),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TpvReport {
    /// 0/1 = no fix, 2 = 2D, 3 = 3D.
    #[serde(default)]
    mode: u8,
    time: Option<DateTime<Utc>>,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
    #[serde(rename = "altMSL")]
    alt_msl: Option<f64>,
    track: Option<f64>,
    speed: Option<f64>,
    epx: Option<f64>,
    epy: Option<f64>,
    eph: Option<f64>,
}

/// Which TPV reports count as fixes.
#[derive(Debug, Clone, Copy)]
struct FixPolicy {
    assumed_accuracy_meters: f64,
    min_mode: u8,
}

impl FixPolicy {
    fn new(assumed_accuracy_meters: f64, request: &PositionRequest) -> Self {
        Self {
            assumed_accuracy_meters,
            min_mode: if request.enable_high_accuracy { 3 } else { 2 },
        }
    }
}

impl TpvReport {
    fn into_position(self, policy: FixPolicy) -> Option<Position> {
        if self.mode < policy.min_mode {
            return None;
        }
        let (latitude, longitude) = (self.lat?, self.lon?);
        let accuracy_meters = match (self.epx, self.epy) {
            (Some(x), Some(y)) => x.max(y),
            _ => self.eph.unwrap_or(policy.assumed_accuracy_meters),
        };

        Position {
            latitude,
            longitude,
            accuracy_meters,
            altitude_meters: self.alt_msl.or(self.alt),
            heading_degrees: self.track,
            speed_mps: self.speed,
            captured_at_utc: self.time.unwrap_or_else(Utc::now),
        }
        .validated()
        .ok()
    }
}

/// Parse one line of gpsd output into a fix, if it carries one.
fn parse_line(line: &str, policy: FixPolicy) -> Option<Position> {
    match serde_json::from_str::<Report>(line) {
        Ok(Report::Tpv(tpv)) => tpv.into_position(policy),
        Ok(Report::Other) => None,
        Err(e) => {
            debug!(error = %e, "Ignoring unparseable gpsd line");
            None
        }
    }
}

struct Session {
    lines: Lines<BufReader<OwnedReadHalf>>,
    // Closing the write half would end the watch.
    _writer: OwnedWriteHalf,
}

impl Session {
    async fn next_fix(&mut self, policy: FixPolicy) -> SourceResult<Position> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(position) = parse_line(&line, policy) {
                        return Ok(position);
                    }
                }
                Ok(None) => return Err(SourceError::unavailable("gpsd closed the connection")),
                Err(e) => return Err(SourceError::unavailable(format!("gpsd read failed: {e}"))),
            }
        }
    }
}

/// Position source backed by a gpsd daemon.
pub struct GpsdSource {
    host: String,
    port: u16,
    assumed_accuracy_meters: f64,
    /// Latest fix seen by any request or subscription.
    last_fix: Arc<Mutex<Option<Position>>>,
}

impl GpsdSource {
    /// Create a source for the gpsd daemon at `host:port`.
    pub fn new(host: impl Into<String>, port: u16, assumed_accuracy_meters: f64) -> Self {
        Self {
            host: host.into(),
            port,
            assumed_accuracy_meters,
            last_fix: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a source from the `[source]` configuration section.
    #[must_use]
    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(
            config.gpsd_host.clone(),
            config.gpsd_port,
            config.assumed_accuracy_meters,
        )
    }

    async fn connect(&self) -> SourceResult<Session> {
        connect(&self.host, self.port).await
    }

}

fn remember(last_fix: &Mutex<Option<Position>>, position: &Position) {
    *last_fix.lock().unwrap_or_else(PoisonError::into_inner) = Some(position.clone());
}

async fn connect(host: &str, port: u16) -> SourceResult<Session> {
    let stream = TcpStream::connect((host, port)).await.map_err(|e| {
        SourceError::unavailable(format!("cannot reach gpsd at {host}:{port}: {e}"))
    })?;
    let (reader, mut writer) = stream.into_split();
    writer
        .write_all(WATCH_COMMAND)
        .await
        .map_err(|e| SourceError::unavailable(format!("failed to start gpsd watch: {e}")))?;
    debug!(host, port, "Connected to gpsd");

    Ok(Session {
        lines: BufReader::new(reader).lines(),
        _writer: writer,
    })
}

#[async_trait]
impl PositionSource for GpsdSource {
    async fn check_permission(&self) -> SourceResult<PermissionStatus> {
        Ok(PermissionStatus::Granted)
    }

    async fn request_permission(&self) -> SourceResult<PermissionStatus> {
        Ok(PermissionStatus::Granted)
    }

    async fn current_position(&self, request: &PositionRequest) -> SourceResult<Position> {
        let cached = self
            .last_fix
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(position) = cached {
            let max_age_ms = u64::try_from(request.maximum_age.as_millis()).unwrap_or(u64::MAX);
            if position.age_ms(Utc::now()) <= max_age_ms {
                return Ok(position);
            }
        }

        let policy = FixPolicy::new(self.assumed_accuracy_meters, request);
        let fetch = async {
            let mut session = self.connect().await?;
            session.next_fix(policy).await
        };
        let position = tokio::time::timeout(request.timeout, fetch)
            .await
            .map_err(|_| SourceError::timed_out(request.timeout))??;

        remember(&self.last_fix, &position);
        Ok(position)
    }

    async fn watch_position(&self, request: &PositionRequest) -> SourceResult<PositionStream> {
        // Fail fast when gpsd is not running at all.
        let session = self.connect().await?;
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);

        let host = self.host.clone();
        let port = self.port;
        let policy = FixPolicy::new(self.assumed_accuracy_meters, request);
        let last_fix = Arc::clone(&self.last_fix);

        tokio::spawn(async move {
            let mut session = Some(session);
            loop {
                if session.is_none() {
                    tokio::select! {
                        () = tx.closed() => break,
                        () = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                    match connect(&host, port).await {
                        Ok(s) => {
                            info!(host = %host, port, "Reconnected to gpsd");
                            session = Some(s);
                        }
                        Err(e) => {
                            if tx.send(Err(e)).await.is_err() {
                                break;
                            }
                            continue;
                        }
                    }
                }
                let Some(active) = session.as_mut() else {
                    continue;
                };

                let item = tokio::select! {
                    () = tx.closed() => break,
                    item = active.next_fix(policy) => item,
                };
                match &item {
                    Ok(position) => remember(&last_fix, position),
                    Err(e) => {
                        warn!(error = %e, "gpsd stream interrupted");
                        session = None;
                    }
                }
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            debug!("gpsd subscription ended");
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    const TPV_3D: &str = r#"{"class":"TPV","device":"/dev/ttyACM0","mode":3,"time":"2025-01-15T14:30:00.000Z","lat":40.7128,"lon":-74.006,"altMSL":12.5,"track":87.1,"speed":1.2,"epx":6.5,"epy":9.0,"eph":11.0}"#;

    const TPV_2D_NOW: &str = r#"{"class":"TPV","mode":2,"lat":51.5,"lon":-0.12,"eph":8.0}"#;

    const ANY_FIX: FixPolicy = FixPolicy {
        assumed_accuracy_meters: 25.0,
        min_mode: 2,
    };

    #[test]
    fn test_parse_tpv_report() {
        let position = parse_line(TPV_3D, ANY_FIX).unwrap();
        assert!((position.latitude - 40.7128).abs() < f64::EPSILON);
        assert!((position.longitude + 74.006).abs() < f64::EPSILON);
        assert!((position.accuracy_meters - 9.0).abs() < f64::EPSILON);
        assert_eq!(position.altitude_meters, Some(12.5));
        assert_eq!(position.heading_degrees, Some(87.1));
        assert_eq!(position.speed_mps, Some(1.2));
        assert_eq!(
            position.captured_at_utc.to_rfc3339(),
            "2025-01-15T14:30:00+00:00"
        );
    }

    #[test]
    fn test_parse_falls_back_to_eph_then_assumed_accuracy() {
        let line = r#"{"class":"TPV","mode":2,"lat":1.0,"lon":2.0,"eph":14.0}"#;
        assert!((parse_line(line, ANY_FIX).unwrap().accuracy_meters - 14.0).abs() < f64::EPSILON);

        let line = r#"{"class":"TPV","mode":2,"lat":1.0,"lon":2.0}"#;
        assert!((parse_line(line, ANY_FIX).unwrap().accuracy_meters - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_ignores_reports_without_fix() {
        assert!(parse_line(r#"{"class":"TPV","mode":1}"#, ANY_FIX).is_none());
        assert!(parse_line(r#"{"class":"TPV","mode":3,"lat":1.0}"#, ANY_FIX).is_none());
        assert!(parse_line(r#"{"class":"VERSION","release":"3.25"}"#, ANY_FIX).is_none());
        assert!(parse_line(r#"{"class":"SKY","satellites":[]}"#, ANY_FIX).is_none());
        assert!(parse_line("not json", ANY_FIX).is_none());
    }

    #[test]
    fn test_high_accuracy_requires_3d_fix() {
        let precise = FixPolicy::new(25.0, &PositionRequest::default());
        assert!(parse_line(TPV_2D_NOW, precise).is_none());
        assert!(parse_line(TPV_3D, precise).is_some());

        let relaxed = FixPolicy::new(
            25.0,
            &PositionRequest {
                enable_high_accuracy: false,
                ..PositionRequest::default()
            },
        );
        assert!(parse_line(TPV_2D_NOW, relaxed).is_some());
    }

    /// A one-connection gpsd stand-in that replays `lines` after the WATCH command.
    async fn fake_gpsd(lines: Vec<&'static str>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 128];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"{\"class\":\"VERSION\",\"release\":\"3.25\"}\n")
                .await
                .unwrap();
            for line in lines {
                socket.write_all(line.as_bytes()).await.unwrap();
                socket.write_all(b"\n").await.unwrap();
            }
            // Keep the connection open until the client goes away.
            let _ = socket.read(&mut buf).await;
        });
        port
    }

    #[tokio::test]
    async fn test_current_position_from_daemon() {
        let port = fake_gpsd(vec![r#"{"class":"TPV","mode":1}"#, TPV_3D]).await;
        let source = GpsdSource::new("127.0.0.1", port, 25.0);

        let position = source
            .current_position(&PositionRequest::default())
            .await
            .unwrap();
        assert!((position.latitude - 40.7128).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_watch_streams_fixes() {
        let port = fake_gpsd(vec![TPV_3D, TPV_3D]).await;
        let source = GpsdSource::new("127.0.0.1", port, 25.0);

        let mut stream = source
            .watch_position(&PositionRequest::default())
            .await
            .unwrap();
        assert!(stream.recv().await.unwrap().is_ok());
        assert!(stream.recv().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_streamed_fixes_feed_one_shot_cache() {
        // The stand-in accepts a single connection, so a one-shot read that
        // ignored the cache would wait for a fix that never comes.
        let port = fake_gpsd(vec![TPV_2D_NOW]).await;
        let source = GpsdSource::new("127.0.0.1", port, 25.0);
        let request = PositionRequest {
            enable_high_accuracy: false,
            timeout: Duration::from_millis(200),
            ..PositionRequest::default()
        };

        let mut stream = source.watch_position(&request).await.unwrap();
        let streamed = stream.recv().await.unwrap().unwrap();

        let cached = source.current_position(&request).await.unwrap();
        assert_eq!(cached, streamed);
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_unavailable() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let source = GpsdSource::new("127.0.0.1", port, 25.0);

        let err = source
            .watch_position(&PositionRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::source::SourceErrorKind::PositionUnavailable);
    }

    #[tokio::test]
    async fn test_permission_is_always_granted() {
        let source = GpsdSource::new("127.0.0.1", 2947, 25.0);
        assert_eq!(
            source.request_permission().await.unwrap(),
            PermissionStatus::Granted
        );
    }
}
