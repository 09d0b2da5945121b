use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use shared::AnalysisResult;
use std::collections::HashMap;
use std::future::Future;
use uuid::Uuid;

use super::repository::{AnalysisRepository, FarmerRepository, RepositoryError};
use crate::diagnosis::models::{Analysis, AnalysisImage};
use crate::farmers::models::{Farmer, PreferredLanguage};

type Item = HashMap<String, AttributeValue>;

#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    farmers_table: String,
    analyses_table: String,
    images_table: String,
}

impl DynamoDbRepository {
    pub fn new(
        client: Client,
        farmers_table: String,
        analyses_table: String,
        images_table: String,
    ) -> Self {
        Self {
            client,
            farmers_table,
            analyses_table,
            images_table,
        }
    }

    fn key(id: Uuid) -> Item {
        let mut key = HashMap::new();
        key.insert("id".to_string(), AttributeValue::S(id.to_string()));
        key
    }

    /// Every item of `table` whose `attribute` equals `value`, across all
    /// scan pages.
    async fn scan_eq(
        &self,
        table: &str,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<Item>, RepositoryError> {
        collect_pages(|start_key| async move {
            let page = self
                .client
                .scan()
                .table_name(table)
                .filter_expression("#attr = :value")
                .expression_attribute_names("#attr", attribute)
                .expression_attribute_values(":value", AttributeValue::S(value.to_string()))
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|e| {
                    log::error!("DynamoDB scan on '{}' by {} failed: {:?}", table, attribute, e);
                    RepositoryError::DynamoDb(e.to_string())
                })?;
            Ok::<_, RepositoryError>((page.items.unwrap_or_default(), page.last_evaluated_key))
        })
        .await
    }

    async fn load_images(&self, analysis_id: Uuid) -> Result<Vec<AnalysisImage>, RepositoryError> {
        let items = self
            .scan_eq(&self.images_table, "analysis_id", &analysis_id.to_string())
            .await?;
        let mut images = items
            .into_iter()
            .map(parse_image_from_item)
            .collect::<Result<Vec<_>, _>>()?;
        images.sort_by_key(|image| image.index);
        Ok(images)
    }

    async fn put_farmer(&self, farmer: &Farmer, condition: &str) -> Result<(), RepositoryError> {
        self.client
            .put_item()
            .table_name(&self.farmers_table)
            .set_item(Some(farmer_to_item(farmer)))
            .condition_expression(condition)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    if condition.starts_with("attribute_exists") {
                        RepositoryError::NotFound
                    } else {
                        RepositoryError::Conflict("id".into())
                    }
                } else {
                    log::error!("DynamoDB put_item failed for farmer {}: {:?}", farmer.id, e);
                    RepositoryError::DynamoDb(e.to_string())
                }
            })?;
        Ok(())
    }
}

/// Follows `LastEvaluatedKey` until the last page has been read.
async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<Item>, RepositoryError>
where
    F: FnMut(Option<Item>) -> Fut,
    Fut: Future<Output = Result<(Vec<Item>, Option<Item>), RepositoryError>>,
{
    let mut items = Vec::new();
    let mut start_key = None;
    loop {
        let (page, last_key) = fetch(start_key.take()).await?;
        items.extend(page);
        match last_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => return Ok(items),
        }
    }
}

#[async_trait]
impl AnalysisRepository for DynamoDbRepository {
    async fn create_analysis(&self, analysis: &Analysis) -> Result<(), RepositoryError> {
        let mut item = Self::key(analysis.id);
        if let Some(farmer_id) = analysis.farmer_id {
            item.insert(
                "farmer_id".to_string(),
                AttributeValue::S(farmer_id.to_string()),
            );
        }
        item.insert(
            "crop_type".to_string(),
            AttributeValue::S(analysis.crop_type.clone()),
        );
        item.insert(
            "request_language".to_string(),
            AttributeValue::S(analysis.request_language.clone()),
        );
        item.insert(
            "result".to_string(),
            AttributeValue::S(serde_json::to_string(&analysis.result)?),
        );
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(analysis.created_at.to_rfc3339()),
        );

        self.client
            .put_item()
            .table_name(&self.analyses_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| {
                log::error!("DynamoDB put_item failed for analysis {}: {:?}", analysis.id, e);
                RepositoryError::DynamoDb(e.to_string())
            })?;

        log::info!("Created analysis {} in '{}'", analysis.id, self.analyses_table);
        Ok(())
    }

    async fn add_images(&self, images: &[AnalysisImage]) -> Result<(), RepositoryError> {
        let mut taken: HashMap<Uuid, Vec<u32>> = HashMap::new();
        for image in images {
            if !taken.contains_key(&image.analysis_id) {
                let existing = self.load_images(image.analysis_id).await?;
                taken.insert(
                    image.analysis_id,
                    existing.iter().map(|i| i.index).collect(),
                );
            }
            let indices = taken.entry(image.analysis_id).or_default();
            if indices.contains(&image.index) {
                return Err(RepositoryError::Conflict(format!(
                    "analysis {} already has an image at index {}",
                    image.analysis_id, image.index
                )));
            }
            indices.push(image.index);
        }

        for image in images {
            let mut item = Self::key(image.id);
            item.insert(
                "analysis_id".to_string(),
                AttributeValue::S(image.analysis_id.to_string()),
            );
            item.insert("image".to_string(), AttributeValue::S(image.image.clone()));
            item.insert(
                "index".to_string(),
                AttributeValue::N(image.index.to_string()),
            );
            item.insert(
                "created_at".to_string(),
                AttributeValue::S(image.created_at.to_rfc3339()),
            );

            self.client
                .put_item()
                .table_name(&self.images_table)
                .set_item(Some(item))
                .send()
                .await
                .map_err(|e| {
                    log::error!("DynamoDB put_item failed for image {}: {:?}", image.id, e);
                    RepositoryError::DynamoDb(e.to_string())
                })?;
        }
        Ok(())
    }

    async fn save_result(
        &self,
        analysis_id: Uuid,
        result: &AnalysisResult,
    ) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(result)?;

        self.client
            .update_item()
            .table_name(&self.analyses_table)
            .set_key(Some(Self::key(analysis_id)))
            .update_expression("SET #result = :result")
            .condition_expression("attribute_exists(id)")
            .expression_attribute_names("#result", "result")
            .expression_attribute_values(":result", AttributeValue::S(json))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    RepositoryError::NotFound
                } else {
                    log::error!("DynamoDB update_item failed for analysis {}: {:?}", analysis_id, e);
                    RepositoryError::DynamoDb(e.to_string())
                }
            })?;

        log::debug!("Stored result for analysis {}", analysis_id);
        Ok(())
    }

    async fn get_analysis(&self, analysis_id: Uuid) -> Result<Option<Analysis>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.analyses_table)
            .set_key(Some(Self::key(analysis_id)))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        let Some(item) = result.item else {
            return Ok(None);
        };
        let mut analysis = parse_analysis_from_item(item)?;
        analysis.images = self.load_images(analysis_id).await?;
        Ok(Some(analysis))
    }

    async fn detach_farmer(&self, farmer_id: Uuid) -> Result<usize, RepositoryError> {
        let items = self
            .scan_eq(&self.analyses_table, "farmer_id", &farmer_id.to_string())
            .await?;

        let mut detached = 0;
        for item in items {
            let id = get_uuid(&item, "id")?;
            self.client
                .update_item()
                .table_name(&self.analyses_table)
                .set_key(Some(Self::key(id)))
                .update_expression("REMOVE farmer_id")
                .send()
                .await
                .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;
            detached += 1;
        }

        log::info!("Detached {} analyses from farmer {}", detached, farmer_id);
        Ok(detached)
    }
}

#[async_trait]
impl FarmerRepository for DynamoDbRepository {
    async fn create_farmer(&self, farmer: &Farmer) -> Result<(), RepositoryError> {
        if self.get_farmer_by_phone(&farmer.phone).await?.is_some() {
            return Err(RepositoryError::Conflict("phone".into()));
        }
        if self.get_farmer_by_email(&farmer.email).await?.is_some() {
            return Err(RepositoryError::Conflict("email".into()));
        }
        self.put_farmer(farmer, "attribute_not_exists(id)").await?;
        log::info!("Created farmer {} in '{}'", farmer.id, self.farmers_table);
        Ok(())
    }

    async fn get_farmer_by_id(&self, farmer_id: Uuid) -> Result<Option<Farmer>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.farmers_table)
            .set_key(Some(Self::key(farmer_id)))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        result.item.map(parse_farmer_from_item).transpose()
    }

    async fn get_farmer_by_phone(&self, phone: &str) -> Result<Option<Farmer>, RepositoryError> {
        let items = self.scan_eq(&self.farmers_table, "phone", phone).await?;
        items.into_iter().next().map(parse_farmer_from_item).transpose()
    }

    async fn get_farmer_by_email(&self, email: &str) -> Result<Option<Farmer>, RepositoryError> {
        let items = self.scan_eq(&self.farmers_table, "email", email).await?;
        items.into_iter().next().map(parse_farmer_from_item).transpose()
    }

    async fn update_farmer(&self, farmer: &Farmer) -> Result<(), RepositoryError> {
        if let Some(other) = self.get_farmer_by_email(&farmer.email).await? {
            if other.id != farmer.id {
                return Err(RepositoryError::Conflict("email".into()));
            }
        }
        self.put_farmer(farmer, "attribute_exists(id)").await?;
        log::info!("Updated farmer {}", farmer.id);
        Ok(())
    }

    async fn delete_farmer(&self, farmer_id: Uuid) -> Result<(), RepositoryError> {
        self.client
            .delete_item()
            .table_name(&self.farmers_table)
            .set_key(Some(Self::key(farmer_id)))
            .condition_expression("attribute_exists(id)")
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    RepositoryError::NotFound
                } else {
                    RepositoryError::DynamoDb(e.to_string())
                }
            })?;
        log::info!("Deleted farmer {}", farmer_id);
        Ok(())
    }
}

fn farmer_to_item(farmer: &Farmer) -> Item {
    let mut item = DynamoDbRepository::key(farmer.id);
    item.insert("phone".to_string(), AttributeValue::S(farmer.phone.clone()));
    item.insert("email".to_string(), AttributeValue::S(farmer.email.clone()));
    item.insert(
        "first_name".to_string(),
        AttributeValue::S(farmer.first_name.clone()),
    );
    item.insert(
        "last_name".to_string(),
        AttributeValue::S(farmer.last_name.clone()),
    );
    item.insert(
        "district".to_string(),
        AttributeValue::S(farmer.district.clone()),
    );
    item.insert("taluk".to_string(), AttributeValue::S(farmer.taluk.clone()));
    item.insert(
        "village".to_string(),
        AttributeValue::S(farmer.village.clone()),
    );
    if let Some(land_size) = farmer.land_size {
        item.insert(
            "land_size".to_string(),
            AttributeValue::N(land_size.to_string()),
        );
    }
    item.insert(
        "crops_grown".to_string(),
        AttributeValue::L(
            farmer
                .crops_grown
                .iter()
                .map(|crop| AttributeValue::S(crop.clone()))
                .collect(),
        ),
    );
    let language = match farmer.preferred_language {
        PreferredLanguage::En => "en",
        PreferredLanguage::Kn => "kn",
    };
    item.insert(
        "preferred_language".to_string(),
        AttributeValue::S(language.to_string()),
    );
    item.insert(
        "is_verified".to_string(),
        AttributeValue::Bool(farmer.is_verified),
    );
    item.insert(
        "is_active".to_string(),
        AttributeValue::Bool(farmer.is_active),
    );
    item.insert(
        "password_hash".to_string(),
        AttributeValue::S(farmer.password_hash.clone()),
    );
    if let Some(otp) = &farmer.otp {
        item.insert("otp".to_string(), AttributeValue::S(otp.clone()));
    }
    if let Some(otp_created_at) = &farmer.otp_created_at {
        item.insert(
            "otp_created_at".to_string(),
            AttributeValue::S(otp_created_at.to_rfc3339()),
        );
    }
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(farmer.created_at.to_rfc3339()),
    );
    item.insert(
        "updated_at".to_string(),
        AttributeValue::S(farmer.updated_at.to_rfc3339()),
    );
    item
}

fn get_s<'a>(item: &'a Item, key: &str) -> Result<&'a String, RepositoryError> {
    item.get(key)
        .and_then(|av| av.as_s().ok())
        .ok_or_else(|| RepositoryError::InvalidData(format!("Missing {} attribute", key)))
}

fn get_opt_s(item: &Item, key: &str) -> Option<String> {
    item.get(key).and_then(|av| av.as_s().ok()).cloned()
}

fn get_uuid(item: &Item, key: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(get_s(item, key)?)
        .map_err(|e| RepositoryError::InvalidData(format!("Invalid {}: {}", key, e)))
}

fn get_bool(item: &Item, key: &str) -> bool {
    item.get(key)
        .and_then(|av| av.as_bool().ok())
        .copied()
        .unwrap_or(false)
}

fn parse_time(raw: &str, key: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::InvalidData(format!("Invalid {}: {}", key, e)))
}

fn get_time(item: &Item, key: &str) -> Result<DateTime<Utc>, RepositoryError> {
    parse_time(get_s(item, key)?, key)
}

fn parse_analysis_from_item(item: Item) -> Result<Analysis, RepositoryError> {
    let farmer_id = get_opt_s(&item, "farmer_id")
        .map(|raw| {
            Uuid::parse_str(&raw)
                .map_err(|e| RepositoryError::InvalidData(format!("Invalid farmer_id: {}", e)))
        })
        .transpose()?;
    let result = match get_opt_s(&item, "result") {
        Some(json) => serde_json::from_str(&json)?,
        None => AnalysisResult::default(),
    };

    Ok(Analysis {
        id: get_uuid(&item, "id")?,
        farmer_id,
        crop_type: get_opt_s(&item, "crop_type").unwrap_or_default(),
        request_language: get_opt_s(&item, "request_language")
            .unwrap_or_else(|| "en".to_string()),
        result,
        created_at: get_time(&item, "created_at")?,
        images: Vec::new(),
    })
}

fn parse_image_from_item(item: Item) -> Result<AnalysisImage, RepositoryError> {
    let index = item
        .get("index")
        .and_then(|av| av.as_n().ok())
        .and_then(|n| n.parse::<u32>().ok())
        .ok_or_else(|| RepositoryError::InvalidData("Missing index attribute".into()))?;

    Ok(AnalysisImage {
        id: get_uuid(&item, "id")?,
        analysis_id: get_uuid(&item, "analysis_id")?,
        image: get_s(&item, "image")?.clone(),
        index,
        created_at: get_time(&item, "created_at")?,
    })
}

fn parse_farmer_from_item(item: Item) -> Result<Farmer, RepositoryError> {
    let land_size = item
        .get("land_size")
        .and_then(|av| av.as_n().ok())
        .and_then(|n| n.parse::<f64>().ok());
    let crops_grown = item
        .get("crops_grown")
        .and_then(|av| av.as_l().ok())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_s().ok().cloned())
                .collect()
        })
        .unwrap_or_default();
    let preferred_language = get_opt_s(&item, "preferred_language")
        .and_then(|raw| PreferredLanguage::parse(&raw))
        .unwrap_or_default();
    let otp_created_at = get_opt_s(&item, "otp_created_at")
        .map(|raw| parse_time(&raw, "otp_created_at"))
        .transpose()?;

    Ok(Farmer {
        id: get_uuid(&item, "id")?,
        phone: get_s(&item, "phone")?.clone(),
        email: get_s(&item, "email")?.clone(),
        first_name: get_opt_s(&item, "first_name").unwrap_or_default(),
        last_name: get_opt_s(&item, "last_name").unwrap_or_default(),
        district: get_opt_s(&item, "district").unwrap_or_default(),
        taluk: get_opt_s(&item, "taluk").unwrap_or_default(),
        village: get_opt_s(&item, "village").unwrap_or_default(),
        land_size,
        crops_grown,
        preferred_language,
        is_verified: get_bool(&item, "is_verified"),
        is_active: get_bool(&item, "is_active"),
        password_hash: get_s(&item, "password_hash")?.clone(),
        otp: get_opt_s(&item, "otp"),
        otp_created_at,
        created_at: get_time(&item, "created_at")?,
        updated_at: get_time(&item, "updated_at")?,
    })
}
