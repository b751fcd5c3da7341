use actix_web::dev::ServiceRequest;
use actix_web::web;
use actix_web_httpauth::extractors::basic::BasicAuth;
use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Serialize};

/// The single login pair the service accepts.
#[derive(Clone, Debug)]
pub struct LoginCredentials {
    pub username: String,
    password_hash: String,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: &str) -> Self {
        Self {
            username: username.into(),
            password_hash: hash_password(password),
        }
    }

    pub fn check(&self, username: &str, password: &str) -> bool {
        !password.is_empty()
            && self.username == username
            && verify_password(password, &self.password_hash)
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Session {
    pub logged_in: bool,
    pub username: String,
    pub student_id: i32,
}

pub fn hash_password(password: &str) -> String {
    hex::encode(Blake2b512::digest(password.as_bytes()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let computed = hash_password(password);
    // constant time
    computed.len() == hash.len()
        && computed
            .bytes()
            .zip(hash.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

pub async fn basic_validator(
    req: ServiceRequest,
    auth: BasicAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let ok = match req.app_data::<web::Data<LoginCredentials>>() {
        Some(login) => login.check(auth.user_id(), auth.password().unwrap_or("")),
        None => false,
    };
    if ok {
        Ok(req)
    } else {
        log::warn!("rejected credentials for {:?}", auth.user_id());
        Err((actix_web::error::ErrorUnauthorized("invalid credentials"), req))
    }
}
