//! Encoding engine thread.
//!
//! ONNX sessions are stateful (`&mut` per inference), so a dedicated OS
//! thread owns the encoder and serializes inference; async request handlers
//! talk to it through a clone-safe [`EngineHandle`]. Everything after
//! encoding (registry scan, remote calls) stays on the async runtime.

use reunite_core::{EncodeError, EncodedFace, ImageEncoder};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Encode {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<EncodedFace, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Encode an image into its primary face embedding.
    pub async fn encode(&self, image: Vec<u8>) -> Result<EncodedFace, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Encode {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The encoder is constructed by the caller (fail-fast at startup if models
/// are missing) and moved into the thread; the thread exits when the last
/// handle is dropped.
pub fn spawn_engine(mut encoder: Box<dyn ImageEncoder>) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("reunite-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Encode { image, reply } => {
                        let result = encoder.encode(&image).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}
