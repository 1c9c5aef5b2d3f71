//! Sequential TCP frame server, plus the matching one-shot sender.

use super::frame::{read_frame, write_frame, FrameRead};
use super::TransportError;
use crate::image_proc::{normalize, ImageProcessor};
use image::ImageFormat;
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Per-connection counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Complete frames read off the wire
    pub frames_received: u64,
    /// Frames that made it onto the panel
    pub frames_displayed: u64,
    /// Frames dropped because they failed to decode or dispatch
    pub frames_rejected: u64,
}

/// Read and display frames until the peer goes away.
///
/// Decode and dispatch failures only drop the offending frame; the loop ends
/// on a clean close, a payload cut short, or a transport error.
pub async fn serve_connection<R>(
    reader: &mut R,
    processor: &ImageProcessor,
    max_frame_bytes: u64,
) -> Result<ConnectionStats, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut stats = ConnectionStats::default();

    loop {
        let payload = match read_frame(reader, max_frame_bytes).await? {
            FrameRead::Frame(payload) => payload,
            FrameRead::Closed => break,
            FrameRead::Truncated { expected, received } => {
                tracing::warn!(
                    "Connection closed after {} of {} payload bytes",
                    received,
                    expected
                );
                break;
            }
        };
        stats.frames_received += 1;

        match processor.process(payload).await {
            Ok(()) => stats.frames_displayed += 1,
            Err(e) => {
                stats.frames_rejected += 1;
                tracing::warn!("Dropping frame: {}", e);
            }
        }
    }

    Ok(stats)
}

/// TCP server for the binary frame protocol
pub struct SocketServer {
    processor: Arc<ImageProcessor>,
    max_frame_bytes: u64,
}

impl SocketServer {
    pub fn new(processor: Arc<ImageProcessor>, max_frame_bytes: u64) -> Self {
        Self {
            processor,
            max_frame_bytes,
        }
    }

    /// Accept connections one after another until shutdown
    pub async fn run_with_shutdown(
        &self,
        addr: SocketAddr,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), TransportError> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Frame server listening on {}", addr);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    tokio::select! {
                        _ = self.handle(stream, peer) => {}
                        _ = shutdown.recv() => break,
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Frame server shutting down");
        Ok(())
    }

    async fn handle(&self, mut stream: TcpStream, peer: SocketAddr) {
        tracing::info!("Connected by {}", peer);
        let _ = stream.set_nodelay(true);

        match serve_connection(&mut stream, &self.processor, self.max_frame_bytes).await {
            Ok(stats) => tracing::info!(
                "Connection with {} closed: {} frames, {} displayed, {} rejected",
                peer,
                stats.frames_received,
                stats.frames_displayed,
                stats.frames_rejected
            ),
            Err(e) => tracing::warn!("Connection with {} failed: {}", peer, e),
        }
    }
}

/// Resize an image file to the panel size and send it as a single frame
pub async fn send_image(
    path: &Path,
    target: &str,
    width: u32,
    height: u32,
) -> Result<usize, TransportError> {
    let img = image::open(path)?;
    let frame = normalize(img, width, height);

    let mut png = Cursor::new(Vec::new());
    frame.into_rgb().write_to(&mut png, ImageFormat::Png)?;
    let png = png.into_inner();

    let mut stream = TcpStream::connect(target).await?;
    write_frame(&mut stream, &png).await?;
    tracing::info!("Sent {} byte frame to {}", png.len(), target);
    Ok(png.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::test_support::{png, recording_processor};
    use tokio::io::AsyncWriteExt;

    const MAX: u64 = 1 << 20;

    #[tokio::test]
    async fn invalid_frame_keeps_connection_open() {
        let (processor, recorder) = recording_processor();
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);

        let mut wire = 0x10u64.to_be_bytes().to_vec();
        wire.extend_from_slice(&[0x42; 16]);
        client.write_all(&wire).await.unwrap();
        write_frame(&mut client, &png(128, 128, [0, 255, 0])).await.unwrap();
        drop(client);

        let stats = serve_connection(&mut server, &processor, MAX).await.unwrap();

        assert_eq!(
            stats,
            ConnectionStats {
                frames_received: 2,
                frames_displayed: 1,
                frames_rejected: 1,
            }
        );
        let frames = recorder.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].dimensions(), (64, 64));
    }

    #[tokio::test]
    async fn short_payload_ends_loop_without_decoding() {
        let (processor, recorder) = recording_processor();
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);

        let image = png(8, 8, [1, 2, 3]);
        client
            .write_all(&(image.len() as u64).to_be_bytes())
            .await
            .unwrap();
        client.write_all(&image[..image.len() - 1]).await.unwrap();
        drop(client);

        let stats = serve_connection(&mut server, &processor, MAX).await.unwrap();

        assert_eq!(stats, ConnectionStats::default());
        assert!(recorder.frames().is_empty());
    }

    #[tokio::test]
    async fn zero_length_frame_closes_connection() {
        let (processor, recorder) = recording_processor();
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);

        client.write_all(&0u64.to_be_bytes()).await.unwrap();
        write_frame(&mut client, &png(8, 8, [0, 0, 255])).await.unwrap();
        drop(client);

        let stats = serve_connection(&mut server, &processor, MAX).await.unwrap();

        assert_eq!(stats, ConnectionStats::default());
        assert!(recorder.frames().is_empty());
    }

    #[tokio::test]
    async fn immediate_close_is_clean() {
        let (processor, _recorder) = recording_processor();
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let stats = serve_connection(&mut server, &processor, MAX).await.unwrap();
        assert_eq!(stats.frames_received, 0);
    }

    #[tokio::test]
    async fn oversized_frame_ends_connection_with_error() {
        let (processor, recorder) = recording_processor();
        let (mut client, mut server) = tokio::io::duplex(64);

        client.write_all(&(MAX + 1).to_be_bytes()).await.unwrap();
        drop(client);

        let result = serve_connection(&mut server, &processor, MAX).await;
        assert!(matches!(result, Err(TransportError::FrameTooLarge { .. })));
        assert!(recorder.frames().is_empty());
    }

    #[tokio::test]
    async fn server_serves_connections_in_turn() {
        let (processor, recorder) = recording_processor();
        let server = SocketServer::new(processor, MAX);

        // Grab a free port, then hand it to the server
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let server_task =
            tokio::spawn(async move { server.run_with_shutdown(addr, shutdown_rx).await });

        let mut stream = loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => break stream,
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        };
        write_frame(&mut stream, &png(16, 16, [9, 9, 9])).await.unwrap();
        drop(stream);

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut stream, &png(32, 8, [8, 8, 8])).await.unwrap();
        drop(stream);

        for _ in 0..200 {
            if recorder.frames().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(recorder.frames().len(), 2);

        shutdown_tx.send(()).unwrap();
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn send_image_delivers_panel_sized_png() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let path = std::env::temp_dir().join(format!(
            "led-matrix-send-test-{}.png",
            std::process::id()
        ));
        std::fs::write(&path, png(200, 100, [255, 0, 0])).unwrap();

        let receiver = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_frame(&mut stream, MAX).await.unwrap()
        });

        send_image(&path, &addr.to_string(), 64, 64).await.unwrap();
        let _ = std::fs::remove_file(&path);

        let FrameRead::Frame(payload) = receiver.await.unwrap() else {
            panic!("no frame received");
        };
        let img = image::load_from_memory(&payload).unwrap();
        assert_eq!((img.width(), img.height()), (64, 64));
    }
}
