use std::fmt;
use std::sync::Arc;
use webrtc::track::track_local::TrackLocal;

pub type LocalTrack = Arc<dyn TrackLocal + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Locally captured media, shared read-only by every negotiation of a call.
#[derive(Clone)]
pub struct MediaHandle {
    inner: Arc<MediaInner>,
}

struct MediaInner {
    stream_id: String,
    tracks: Vec<LocalTrack>,
}

impl MediaHandle {
    pub fn new(stream_id: impl Into<String>, tracks: Vec<LocalTrack>) -> Self {
        Self {
            inner: Arc::new(MediaInner {
                stream_id: stream_id.into(),
                tracks,
            }),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.inner.tracks
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.inner
            .tracks
            .iter()
            .map(|t| t.id().to_owned())
            .collect()
    }

    /// Number of live clones of this handle.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("stream_id", &self.inner.stream_id)
            .field("tracks", &self.track_ids())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
    Unknown,
}

/// A media track received from a remote member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}
