//! Effective identities: declared credentials resolved into live
//! bearer/cookie state, safe to share across concurrent probe tasks.

use std::sync::Arc;

use log::info;
use tokio::sync::Mutex;

use crate::client::Credential;
use crate::config::{AuthScheme, AuthType};
use crate::error::AuthFlowError;

use super::flows::{fetch_oauth2_token, perform_form_login, refresh_oauth2_token};

/// Outcome of resolving one declared identity at run start.
///
/// Resolution failures are local to the identity: the run continues and
/// every variant for a failed identity records the error.
pub enum ResolvedIdentity {
    Ready(Arc<EffectiveIdentity>),
    Failed { name: String, message: String },
}

impl ResolvedIdentity {
    pub fn name(&self) -> &str {
        match self {
            ResolvedIdentity::Ready(identity) => identity.name(),
            ResolvedIdentity::Failed { name, .. } => name,
        }
    }
}

struct CredentialState {
    credential: Credential,
    refresh_token: Option<String>,
    /// Bumped on every successful refresh; lets concurrent 401 handlers
    /// detect that someone else already swapped the credential.
    generation: u64,
}

/// A resolved identity whose token/cookie state may be refreshed mid-run.
///
/// All mutation happens under the internal mutex, held across the refresh
/// network call so refresh-and-retry is atomic with respect to other
/// tasks using the same identity.
pub struct EffectiveIdentity {
    name: String,
    declared: AuthScheme,
    state: Mutex<CredentialState>,
}

impl EffectiveIdentity {
    /// Resolve a declarative scheme into an effective credential:
    /// oauth2 → bearer, form_login → cookie, static types pass through.
    pub async fn resolve(declared: &AuthScheme) -> Result<Self, AuthFlowError> {
        let mut refresh_token = None;
        let credential = match declared.auth_type {
            AuthType::Oauth2 => {
                let grant = fetch_oauth2_token(declared).await?;
                refresh_token = grant.refresh_token;
                Credential::Bearer {
                    header: auth_header(declared),
                    token: grant.access_token,
                }
            }
            AuthType::FormLogin => Credential::Cookie {
                cookie: perform_form_login(declared).await?,
            },
            AuthType::Bearer => Credential::Bearer {
                header: auth_header(declared),
                token: declared.token.clone().unwrap_or_default(),
            },
            AuthType::Header => Credential::Header {
                header: auth_header(declared),
                value: declared.token.clone().unwrap_or_default(),
            },
            AuthType::Basic => Credential::Basic {
                username: declared.username.clone().unwrap_or_default(),
                password: declared.password.clone().unwrap_or_default(),
            },
            AuthType::Cookie => Credential::Cookie {
                cookie: declared.cookie.clone().unwrap_or_default(),
            },
        };

        Ok(Self {
            name: declared.name.clone(),
            declared: declared.clone(),
            state: Mutex::new(CredentialState {
                credential,
                refresh_token,
                generation: 0,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Only dynamically resolved identities can recover from a 401.
    pub fn is_refreshable(&self) -> bool {
        matches!(
            self.declared.auth_type,
            AuthType::Oauth2 | AuthType::FormLogin
        )
    }

    /// Snapshot the current credential together with its generation.
    pub async fn credential(&self) -> (Credential, u64) {
        let state = self.state.lock().await;
        (state.credential.clone(), state.generation)
    }

    /// Refresh after a 401 observed with `seen_generation`.
    ///
    /// If another task already refreshed (generation moved on), the newer
    /// credential is returned without a second flow. OAuth2 tries the
    /// refresh-token grant first and falls back to re-authenticating;
    /// form login simply logs in again.
    pub async fn refresh_after_unauthorized(
        &self,
        seen_generation: u64,
    ) -> Result<Credential, AuthFlowError> {
        let mut state = self.state.lock().await;
        if state.generation != seen_generation {
            return Ok(state.credential.clone());
        }

        match self.declared.auth_type {
            AuthType::Oauth2 => {
                let refreshed = match state.refresh_token.as_deref() {
                    Some(rt) => refresh_oauth2_token(&self.declared, rt).await,
                    None => None,
                };
                let token = match refreshed {
                    Some(token) => token,
                    None => {
                        let grant = fetch_oauth2_token(&self.declared).await?;
                        state.refresh_token = grant.refresh_token;
                        grant.access_token
                    }
                };
                state.credential = Credential::Bearer {
                    header: auth_header(&self.declared),
                    token,
                };
            }
            AuthType::FormLogin => {
                state.credential = Credential::Cookie {
                    cookie: perform_form_login(&self.declared).await?,
                };
            }
            // static identities have nothing to refresh
            _ => return Ok(state.credential.clone()),
        }

        state.generation += 1;
        info!("Refreshed credential for identity '{}'", self.name);
        Ok(state.credential.clone())
    }
}

fn auth_header(scheme: &AuthScheme) -> String {
    scheme
        .header
        .clone()
        .unwrap_or_else(|| "Authorization".to_string())
}
