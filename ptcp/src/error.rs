use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("connect() called outside LISTEN state")]
    ErrNotListening,
    #[error("send() called before the connection is ESTABLISHED")]
    ErrNotConnected,
    #[error("socket is closed")]
    ErrClosed,
    #[error("send FIFO is full, try again once writable() fires")]
    ErrWouldBlock,
    #[error("message exceeds the negotiated MSS and this socket requires atomic sends")]
    ErrMessageTooLarge,
    #[error("malformed pseudo-TCP header")]
    ErrMalformedHeader,
    #[error("malformed CONNECT option block")]
    ErrMalformedOptions,
}
