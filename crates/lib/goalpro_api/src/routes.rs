//! Route paths.

pub const GET_STATUS: &str = "/status";

pub const POST_USERS_REGISTER: &str = "/users/register";
pub const POST_USERS_LOGIN: &str = "/users/login";
pub const POST_USERS_LOGOUT: &str = "/users/logout";
pub const POST_USERS_FORGOT_PASSWORD: &str = "/users/forgot-password";
pub const POST_USERS_RESET_PASSWORD: &str = "/users/reset-password";

pub const GET_USERS: &str = "/users";
pub const GET_USERS_PLAYERS: &str = "/users/players";
pub const GET_USERS_ROLE: &str = "/users/role/{role}";
/// `GET` and `PUT`.
pub const USERS_USERNAME: &str = "/users/{username}";

/// `GET` and `POST`.
pub const TEAMS: &str = "/teams";
/// `GET` and `PUT`.
pub const TEAMS_ID: &str = "/teams/{id}";
pub const PUT_TEAMS_ID_COACH_USERNAME: &str = "/teams/{id}/coach/{username}";
/// `PUT` and `DELETE`.
pub const TEAMS_ID_PLAYERS_USERNAME: &str = "/teams/{id}/players/{username}";
