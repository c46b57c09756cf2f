use std::sync::Arc;

use duet_media::signer::HmacSigner;
use duet_media::storage::ObjectStorage;

use crate::channel::MessageChannel;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub channel: MessageChannel,
    pub storage: Arc<ObjectStorage>,
    pub signer: HmacSigner,
    pub jwt_secret: String,
    pub max_upload_bytes: usize,
}
