//! Talking to the recognition service: request shaping, transports, the
//! debounced single-flight client and response normalization.

pub mod channel;
pub mod client;
pub mod error;
pub mod normalize;
pub mod transport;
pub mod types;

pub use channel::{channel_pair, ChannelConnector, ChannelTransport};
pub use client::{RecognitionClient, RecognitionEvent, Trigger};
pub use error::RecognitionError;
pub use normalize::{format_result, normalize, parse_response};
pub use transport::{HttpTransport, NoToken, RecognitionTransport, StaticToken, TokenProvider};
pub use types::{RecognitionRequest, RecognitionResponse, RecognitionResult};
