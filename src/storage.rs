use crate::error::{Error, Result};
use crate::signing::{CosSigner, Signer};
use chrono::Utc;
use log::{debug, info, warn};
use rand::Rng;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, ETAG};
use reqwest::{Client, Url};
use serde::Serialize;
use std::time::Duration;

pub const SIGNED_URL_TTL: Duration = Duration::from_secs(3600);
pub const DISPLAY_URL_TTL: Duration = Duration::from_secs(7200);

const EXAM_PREFIX: &str = "exam_papers/";
const UPLOAD_PREFIX: &str = "uploads/";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub key: String,
    pub url: String,
    pub etag: Option<String>,
    pub size: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub last_modified: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub key: String,
    pub size: u64,
    pub last_modified: String,
    pub url: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BucketInfo {
    pub bucket: String,
    pub region: String,
    pub file_count: usize,
    pub total_size: u64,
    pub total_size_mb: f64,
}

pub fn random_suffix() -> String {
    hex::encode(rand::thread_rng().gen::<[u8; 4]>())
}

pub fn exam_image_key(exam_paper_id: i32, index: Option<u32>, timestamp: i64, suffix: &str) -> String {
    match index {
        Some(index) => format!(
            "{}{}/page_{}_{}_{}.jpg",
            EXAM_PREFIX, exam_paper_id, index, timestamp, suffix
        ),
        None => format!("{}{}/{}_{}.jpg", EXAM_PREFIX, exam_paper_id, timestamp, suffix),
    }
}

/// A caller-supplied object name, without leading slashes and with no empty,
/// `.` or `..` segments.
fn checked_name(name: &str) -> Result<&str> {
    let name = name.trim_start_matches('/');
    if name.is_empty() || name.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
        return Err(Error::Validation(format!("invalid object name {:?}", name)));
    }
    Ok(name)
}

pub fn upload_key(name: Option<&str>, timestamp: i64, suffix: &str) -> Result<String> {
    match name {
        Some(name) => {
            let name = checked_name(name)?;
            if name.starts_with(UPLOAD_PREFIX) {
                Ok(name.to_string())
            } else {
                Ok(format!("{}{}", UPLOAD_PREFIX, name))
            }
        }
        None => Ok(format!("{}{}_{}.jpg", UPLOAD_PREFIX, timestamp, suffix)),
    }
}

/// Bare names are taken to be generic uploads.
pub fn delete_key(name: &str) -> Result<String> {
    let name = checked_name(name)?;
    if name.starts_with(UPLOAD_PREFIX) || name.starts_with(EXAM_PREFIX) {
        Ok(name.to_string())
    } else {
        Ok(format!("{}{}", UPLOAD_PREFIX, name))
    }
}

pub fn exam_prefix(exam_paper_id: i32) -> String {
    format!("{}{}/", EXAM_PREFIX, exam_paper_id)
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, tag: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.tag_name().name() == tag)
        .and_then(|n| n.text())
}

/// Reads the `<Contents>` entries of a bucket listing.
pub fn parse_listing(xml: &str) -> Result<Vec<StoredObject>> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| Error::Upstream(format!("unreadable bucket listing: {}", e)))?;
    Ok(doc
        .descendants()
        .filter(|n| n.tag_name().name() == "Contents")
        .filter_map(|contents| {
            let key = child_text(contents, "Key")?;
            Some(StoredObject {
                key: key.to_string(),
                size: child_text(contents, "Size")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(0),
                last_modified: child_text(contents, "LastModified")
                    .unwrap_or("")
                    .to_string(),
            })
        })
        .collect())
}

pub struct ObjectStore {
    client: Client,
    bucket: String,
    region: String,
    signer: Box<dyn Signer>,
}

impl ObjectStore {
    pub fn new(secret_id: &str, secret_key: &str, region: &str, bucket: &str) -> Self {
        Self::with_signer(region, bucket, Box::new(CosSigner::new(secret_id, secret_key)))
    }

    pub fn with_signer(region: &str, bucket: &str, signer: Box<dyn Signer>) -> Self {
        Self {
            client: Client::new(),
            bucket: bucket.to_string(),
            region: region.to_string(),
            signer,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn host(&self) -> String {
        format!("{}.cos.{}.myqcloud.com", self.bucket, self.region)
    }

    fn base_url(&self) -> Result<Url> {
        Url::parse(&format!("https://{}/", self.host()))
            .map_err(|e| Error::Validation(format!("invalid bucket host {}: {}", self.host(), e)))
    }

    /// Request URL of an object; every key segment is percent-encoded.
    pub fn object_url(&self, key: &str) -> Result<Url> {
        let mut url = self.base_url()?;
        url.path_segments_mut()
            .map_err(|_| Error::Validation(format!("invalid bucket host {}", self.host())))?
            .pop_if_empty()
            .extend(key.split('/'));
        Ok(url)
    }

    pub fn public_url(&self, key: &str) -> String {
        match self.object_url(key) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!("unable to build url for {}: {}", key, e);
                format!("https://{}/{}", self.host(), key)
            }
        }
    }

    /// Falls back to the public URL when the request cannot be signed.
    pub fn signed_url(&self, key: &str, ttl: Duration) -> String {
        match self
            .signer
            .authorization("GET", key, Utc::now().timestamp(), ttl)
        {
            Ok(auth) => format!("{}?{}", self.public_url(key), auth),
            Err(e) => {
                warn!("unable to sign url for {}: {}", key, e);
                self.public_url(key)
            }
        }
    }

    /// The key of an object in this bucket, if the URL points into it.
    pub fn key_from_url(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        if url.scheme() != "https" || url.host_str() != Some(self.host().as_str()) {
            return None;
        }
        let path = url.path().trim_start_matches('/');
        if path.is_empty() {
            return None;
        }
        urlencoding::decode(path).ok().map(|key| key.into_owned())
    }

    /// URL handed to the dashboard for an image record.
    pub fn display_url(&self, image_url: &str) -> String {
        match self.key_from_url(image_url) {
            Some(key) => self.signed_url(&key, DISPLAY_URL_TTL),
            None => image_url.to_string(),
        }
    }

    fn authorization(&self, method: &str, key: &str) -> Result<String> {
        self.signer
            .authorization(method, key, Utc::now().timestamp(), SIGNED_URL_TTL)
    }

    async fn put_object(&self, key: String, data: Vec<u8>) -> Result<UploadReceipt> {
        let size = data.len();
        let url = self.object_url(&key)?;
        let response = self
            .client
            .put(url.clone())
            .header(AUTHORIZATION, self.authorization("PUT", &key)?)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(data)
            .send()
            .await?
            .error_for_status()?;
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());
        info!("uploaded {} ({} bytes)", key, size);
        Ok(UploadReceipt {
            key,
            url: url.to_string(),
            etag,
            size,
        })
    }

    pub async fn upload_exam_paper_image(
        &self,
        exam_paper_id: i32,
        index: Option<u32>,
        data: Vec<u8>,
    ) -> Result<UploadReceipt> {
        let key = exam_image_key(
            exam_paper_id,
            index,
            Utc::now().timestamp(),
            &random_suffix(),
        );
        self.put_object(key, data).await
    }

    pub async fn upload(&self, name: Option<&str>, data: Vec<u8>) -> Result<UploadReceipt> {
        let key = upload_key(name, Utc::now().timestamp(), &random_suffix())?;
        self.put_object(key, data).await
    }

    pub async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete(self.object_url(key)?)
            .header(AUTHORIZATION, self.authorization("DELETE", key)?)
            .send()
            .await?
            .error_for_status()?;
        debug!("deleted {}", key);
        Ok(())
    }

    /// Deletes a file by name and returns the key that was removed.
    pub async fn delete_file(&self, name: &str) -> Result<String> {
        let key = delete_key(name)?;
        self.delete_object(&key).await?;
        Ok(key)
    }

    async fn try_list(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        let body = self
            .client
            .get(self.base_url()?)
            .query(&[("prefix", prefix)])
            .header(AUTHORIZATION, self.authorization("GET", "")?)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_listing(&body)
    }

    pub async fn list_files(&self, prefix: &str) -> Vec<StoredObject> {
        match self.try_list(prefix).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!("unable to list {}: {}", prefix, e);
                Vec::new()
            }
        }
    }

    pub async fn list_exam_paper_images(&self, exam_paper_id: i32) -> Vec<StoredImage> {
        self.list_files(&exam_prefix(exam_paper_id))
            .await
            .into_iter()
            .map(|obj| StoredImage {
                url: self.public_url(&obj.key),
                key: obj.key,
                size: obj.size,
                last_modified: obj.last_modified,
            })
            .collect()
    }

    /// Removes every stored image of an exam, returning how many deletions succeeded.
    pub async fn purge_exam_paper_images(&self, exam_paper_id: i32) -> Result<usize> {
        let objects = self.try_list(&exam_prefix(exam_paper_id)).await?;
        let mut deleted = 0;
        for obj in objects {
            match self.delete_object(&obj.key).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!("unable to delete {}: {}", obj.key, e),
            }
        }
        info!("purged {} images of exam paper {}", deleted, exam_paper_id);
        Ok(deleted)
    }

    pub async fn bucket_exists(&self) -> bool {
        let (url, auth) = match (self.base_url(), self.authorization("HEAD", "")) {
            (Ok(url), Ok(auth)) => (url, auth),
            _ => return false,
        };
        match self
            .client
            .head(url)
            .header(AUTHORIZATION, auth)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn bucket_info(&self) -> Result<BucketInfo> {
        if !self.bucket_exists().await {
            return Err(Error::NotFound(format!(
                "bucket {} does not exist",
                self.bucket
            )));
        }
        let objects = self.try_list(EXAM_PREFIX).await?;
        let total_size: u64 = objects.iter().map(|o| o.size).sum();
        Ok(BucketInfo {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            file_count: objects.len(),
            total_size,
            total_size_mb: (total_size as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0,
        })
    }
}
