//! JSON-over-HTTP adapter for [`EntityService`].

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Entity, EntityFields, EntityId},
    error::ApiError,
    protocol::{CreateEntityResponse, ExistsResponse, NameAvailableQuery, NameAvailableResponse},
};
use url::Url;

use crate::{error::EntityError, service::EntityService};

pub struct HttpEntityService {
    http: Client,
    base_url: Url,
}

impl HttpEntityService {
    pub fn new(base_url: &str) -> Result<Self, EntityError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, EntityError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|err| EntityError::service(format!("invalid server url {base_url}: {err}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, EntityError> {
        self.base_url
            .join(path)
            .map_err(|err| EntityError::service(format!("invalid request path {path}: {err}")))
    }

    async fn json<T: DeserializeOwned>(
        &self,
        res: Response,
        id: Option<EntityId>,
    ) -> Result<T, EntityError> {
        let res = check_status(res, id).await?;
        Ok(res.json().await?)
    }
}

async fn check_status(res: Response, id: Option<EntityId>) -> Result<Response, EntityError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => Err(EntityError::from_api(api_error, id)),
        Err(_) => match (status, id) {
            (StatusCode::NOT_FOUND, Some(id)) => Err(EntityError::NotFound(id)),
            (StatusCode::CONFLICT, _) => Err(EntityError::Conflict(body)),
            _ => Err(EntityError::service(format!("unexpected status {status}"))),
        },
    }
}

#[async_trait]
impl EntityService for HttpEntityService {
    async fn fetch(&self, id: EntityId) -> Result<Entity, EntityError> {
        let res = self
            .http
            .get(self.url(&format!("entities/{}", id.0))?)
            .send()
            .await?;
        self.json(res, Some(id)).await
    }

    async fn exists(&self, id: EntityId) -> Result<bool, EntityError> {
        let res = self
            .http
            .get(self.url(&format!("entities/{}/exists", id.0))?)
            .send()
            .await?;
        let body: ExistsResponse = self.json(res, Some(id)).await?;
        Ok(body.exists)
    }

    async fn create(&self, fields: EntityFields) -> Result<EntityId, EntityError> {
        let res = self
            .http
            .post(self.url("entities")?)
            .json(&fields)
            .send()
            .await?;
        let body: CreateEntityResponse = self.json(res, None).await?;
        Ok(body.id)
    }

    async fn update(&self, id: EntityId, fields: EntityFields) -> Result<(), EntityError> {
        let res = self
            .http
            .put(self.url(&format!("entities/{}", id.0))?)
            .json(&fields)
            .send()
            .await?;
        check_status(res, Some(id)).await?;
        Ok(())
    }

    async fn remove(&self, id: EntityId) -> Result<(), EntityError> {
        let res = self
            .http
            .delete(self.url(&format!("entities/{}", id.0))?)
            .send()
            .await?;
        check_status(res, Some(id)).await?;
        Ok(())
    }

    async fn check_name_available(
        &self,
        name: &str,
        exclude_id: Option<EntityId>,
    ) -> Result<bool, EntityError> {
        let res = self
            .http
            .get(self.url("entities/name-available")?)
            .query(&NameAvailableQuery {
                name: name.to_string(),
                exclude_id,
            })
            .send()
            .await?;
        let body: NameAvailableResponse = self.json(res, None).await?;
        Ok(body.available)
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
