//! Request decoration
//!
//! Every outbound call gets a complete header set from a [`RequestDecorator`].
//! The default decorator rotates the User-Agent through a configured pool so
//! consecutive requests do not share one client identity.

use crate::config::IdentityConfig;
use rand::seq::SliceRandom;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN,
    REFERER, USER_AGENT,
};

/// Supplies the headers for one request
pub trait RequestDecorator: Send + Sync {
    fn headers(&self) -> HeaderMap;
}

/// Browser-like headers with a randomly chosen User-Agent per call
#[derive(Debug, Clone)]
pub struct RotatingIdentity {
    user_agents: Vec<HeaderValue>,
    base: HeaderMap,
}

impl RotatingIdentity {
    /// Builds the decorator from the identity section of the config
    pub fn from_config(config: &IdentityConfig) -> Result<Self, InvalidHeaderValue> {
        let user_agents = config
            .user_agents
            .iter()
            .map(|ua| HeaderValue::from_str(ua))
            .collect::<Result<Vec<_>, _>>()?;

        let mut base = HeaderMap::new();
        base.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        base.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        base.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));
        base.insert(
            HeaderName::from_static("sec-fetch-dest"),
            HeaderValue::from_static("empty"),
        );
        base.insert(
            HeaderName::from_static("sec-fetch-mode"),
            HeaderValue::from_static("cors"),
        );
        base.insert(
            HeaderName::from_static("sec-fetch-site"),
            HeaderValue::from_static("same-origin"),
        );
        base.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );

        if let Some(referer) = &config.referer {
            base.insert(REFERER, HeaderValue::from_str(referer)?);
        }
        if let Some(origin) = &config.origin {
            base.insert(ORIGIN, HeaderValue::from_str(origin)?);
        }

        Ok(Self { user_agents, base })
    }
}

impl RequestDecorator for RotatingIdentity {
    fn headers(&self) -> HeaderMap {
        let mut headers = self.base.clone();
        if let Some(ua) = self.user_agents.choose(&mut rand::thread_rng()) {
            headers.insert(USER_AGENT, ua.clone());
        }
        headers
    }
}
