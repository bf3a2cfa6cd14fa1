pub mod domain;
pub mod ports;

pub use domain::{
    answer_url, parse_tags, Answer, AuthSession, FlashLevel, FlashMessage, NotificationEvent,
    Page, Question, QuestionDraft, QuestionPatch, QuestionQuery, QuestionUpdate, User,
    UserCredentials,
};
pub use ports::{
    Broadcaster, ContentStore, PortError, PortResult, SessionReader, SessionStore, UploadStore,
    UserStore,
};
