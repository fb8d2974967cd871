pub mod domain;
pub mod ports;

pub use domain::{
    Bookmark, BookmarkedSummary, DigestFile, ProviderEvent, Quiz, QuizAnswers, QuizQuestion,
    ReadinessState, Session, SessionEvent, SignUpProfile, Summary, UserRef,
};
pub use ports::{
    AuthEventStream, AuthProvider, BlobListOptions, BlobObject, DataService, Navigator, Order,
    PortError, PortResult, RowQuery, RESET_PASSWORD_ROUTE,
};
