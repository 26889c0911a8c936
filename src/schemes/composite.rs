// Composite scheme: fans out to several member schemes

use std::sync::Arc;

use async_trait::async_trait;

use super::Scheme;
use crate::auth::Headers;
use crate::error::AuthError;

pub struct CompositeScheme {
    name: String,
    members: Vec<Arc<dyn Scheme>>,
}

impl CompositeScheme {
    pub fn new(members: Vec<Arc<dyn Scheme>>) -> Self {
        let name = members
            .iter()
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join("+");
        Self { name, members }
    }

    pub fn members(&self) -> &[Arc<dyn Scheme>] {
        &self.members
    }
}

#[async_trait]
impl Scheme for CompositeScheme {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_headers(&self) -> Headers {
        let mut headers = Headers::new();
        for member in &self.members {
            headers.extend(member.get_headers().await);
        }
        headers
    }

    fn is_authenticated(&self) -> bool {
        self.members.iter().any(|m| m.is_authenticated())
    }

    fn clear(&self) {
        for member in &self.members {
            member.clear();
        }
    }

    fn supports_refresh(&self) -> bool {
        self.members.iter().any(|m| m.supports_refresh())
    }

    async fn refresh(&self) -> anyhow::Result<()> {
        match self.members.iter().find(|m| m.supports_refresh()) {
            Some(member) => {
                tracing::debug!(composite = %self.name, member = member.name(), "Delegating refresh");
                member.refresh().await
            }
            None => Err(AuthError::refresh_failed("No schemes support token refresh").into()),
        }
    }
}
