mod comment;
mod like;
mod playlist;
mod user;
mod video;

pub use comment::Comment;
pub use like::Like;
pub use playlist::Playlist;
pub use user::{User, UserPublic};
pub use video::Video;
