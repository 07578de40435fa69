pub mod backend;
pub mod client;
pub mod error;
pub mod frame;
pub mod logging;
pub mod mock_client;
pub mod stream;

pub use backend::{
    BackendError, ByteStream, HttpBackend, HttpMethod, HttpRequest, HttpResponse, ReqwestBackend,
    ResponseBody,
};
pub use client::{
    FetchOptions, RuntimeClient, SseOptions, ACTION_PATH, DEFAULT_STREAM_PATH, LOGS_PATH,
    MANIFEST_PATH, METRICS_PATH, TRACE_PATH,
};
pub use error::{TransportError, TransportErrorKind};
pub use frame::{parse_frame, RETURN_EVENT};
pub use mock_client::{MockBackend, MockResponse};
pub use stream::FrameBuffer;
