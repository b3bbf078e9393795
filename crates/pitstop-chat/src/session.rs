use std::collections::HashMap;

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use pitstop_types::api::Claims;
use pitstop_types::error::ChatError;
use pitstop_types::models::{Identity, UserProfile};

/// Turns an opaque credential into an authenticated identity.
///
/// Credential validation itself belongs to the portal's auth collaborator;
/// this is the thin adapter over it. Any missing, malformed, or expired
/// credential fails closed to `Unauthenticated` — there is no guest
/// identity.
pub trait SessionResolver: Send + Sync {
    fn resolve(&self, credential: &str) -> Result<Identity, ChatError>;
}

/// Resolver for the portal's HMAC-signed session tokens.
pub struct JwtSessionResolver {
    secret: String,
}

impl JwtSessionResolver {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl SessionResolver for JwtSessionResolver {
    fn resolve(&self, credential: &str) -> Result<Identity, ChatError> {
        let data = decode::<Claims>(
            credential,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| ChatError::Unauthenticated)?;

        Ok(Identity {
            id: data.claims.sub,
            display_name: data.claims.name,
            email: data.claims.email,
            role: data.claims.role,
        })
    }
}

/// Mint a session token for an identity. The portal's auth service owns
/// this in production; it lives here for tests and local tooling.
pub fn issue_token(
    secret: &str,
    identity: &Identity,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: identity.id,
        name: identity.display_name.clone(),
        email: identity.email.clone(),
        role: identity.role,
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Profile lookup for roster denormalization. Consulted when staff touch a
/// thread before its customer has sent anything.
pub trait UserDirectory: Send + Sync {
    fn lookup(&self, user_id: Uuid) -> Option<UserProfile>;
}

/// Display values used when the directory has no record for a customer.
pub fn fallback_profile(user_id: Uuid) -> UserProfile {
    let short = user_id.simple().to_string();
    UserProfile {
        id: user_id,
        display_name: format!("Customer {}", &short[..8]),
        email: String::new(),
    }
}

/// Fixed in-memory directory. Enough for tests and single-node deployments
/// where the host preloads known customers.
#[derive(Default)]
pub struct StaticDirectory {
    profiles: HashMap<Uuid, UserProfile>,
}

impl StaticDirectory {
    pub fn new(profiles: impl IntoIterator<Item = UserProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.id, p)).collect(),
        }
    }
}

impl UserDirectory for StaticDirectory {
    fn lookup(&self, user_id: Uuid) -> Option<UserProfile> {
        self.profiles.get(&user_id).cloned()
    }
}
