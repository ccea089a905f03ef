pub mod errors;
pub mod db;
pub mod user;
pub mod user_credentials;
pub mod session;
pub mod verification_token;

#[cfg(test)]
mod tests;
