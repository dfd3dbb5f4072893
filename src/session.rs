/// OAuth state kept between `/login` and `/lockin`.
pub const PENDING_LOGIN: &str = "pending_login";
/// Firebase ID and refresh tokens of the logged-in user.
pub const FIREBASE_TOKENS: &str = "firebase_tokens";
