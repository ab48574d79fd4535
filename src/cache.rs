//! On-disk cache of the normalized delivery table.
//!
//! Format: MAGIC (4 bytes) + VERSION (u32 LE) + bincode(DeliveryColumns).
//! Writes land in a sibling temp file that is renamed over the target, so a
//! reader sees either the old table or the new one, never a mix.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::error::CacheError;
use crate::types::DeliveryRecord;

const MAGIC: &[u8; 4] = b"DKPI";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

/// Column-wise layout of the normalized table.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DeliveryColumns {
    pub order_timestamp: Vec<Option<NaiveDateTime>>,
    pub invoice_timestamp: Vec<Option<NaiveDateTime>>,
    pub route_assigned_timestamp: Vec<Option<NaiveDateTime>>,
    pub arrived_timestamp: Vec<Option<NaiveDateTime>>,
    pub completed_timestamp: Vec<Option<NaiveDateTime>>,
    pub invoice_value: Vec<f64>,
    pub freight_value: Vec<f64>,
    pub zone: Vec<Option<String>>,
    pub rider: Vec<Option<String>>,
    pub client: Vec<Option<String>>,
    pub seller: Vec<Option<String>>,
    pub route_name: Vec<Option<String>>,
    pub service_title: Vec<Option<String>>,
    pub returned: Vec<Option<String>>,
    pub status: Vec<Option<String>>,
    pub outcome_status: Vec<Option<String>>,
    pub date: Vec<Option<NaiveDate>>,
    pub competence: Vec<Option<String>>,
}

impl DeliveryColumns {
    pub fn from_rows(rows: &[DeliveryRecord]) -> Self {
        let mut c = DeliveryColumns::default();
        for r in rows {
            c.order_timestamp.push(r.order_timestamp);
            c.invoice_timestamp.push(r.invoice_timestamp);
            c.route_assigned_timestamp.push(r.route_assigned_timestamp);
            c.arrived_timestamp.push(r.arrived_timestamp);
            c.completed_timestamp.push(r.completed_timestamp);
            c.invoice_value.push(r.invoice_value);
            c.freight_value.push(r.freight_value);
            c.zone.push(r.zone.clone());
            c.rider.push(r.rider.clone());
            c.client.push(r.client.clone());
            c.seller.push(r.seller.clone());
            c.route_name.push(r.route_name.clone());
            c.service_title.push(r.service_title.clone());
            c.returned.push(r.returned.clone());
            c.status.push(r.status.clone());
            c.outcome_status.push(r.outcome_status.clone());
            c.date.push(r.date);
            c.competence.push(r.competence.clone());
        }
        c
    }

    pub fn len(&self) -> usize {
        self.invoice_timestamp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_rectangular(&self) -> bool {
        let n = self.len();
        [
            self.order_timestamp.len(),
            self.route_assigned_timestamp.len(),
            self.arrived_timestamp.len(),
            self.completed_timestamp.len(),
            self.invoice_value.len(),
            self.freight_value.len(),
            self.zone.len(),
            self.rider.len(),
            self.client.len(),
            self.seller.len(),
            self.route_name.len(),
            self.service_title.len(),
            self.returned.len(),
            self.status.len(),
            self.outcome_status.len(),
            self.date.len(),
            self.competence.len(),
        ]
        .iter()
        .all(|len| *len == n)
    }

    pub fn into_rows(self) -> Vec<DeliveryRecord> {
        let mut order = self.order_timestamp.into_iter();
        let mut invoice = self.invoice_timestamp.into_iter();
        let mut route_assigned = self.route_assigned_timestamp.into_iter();
        let mut arrived = self.arrived_timestamp.into_iter();
        let mut completed = self.completed_timestamp.into_iter();
        let mut invoice_value = self.invoice_value.into_iter();
        let mut freight_value = self.freight_value.into_iter();
        let mut zone = self.zone.into_iter();
        let mut rider = self.rider.into_iter();
        let mut client = self.client.into_iter();
        let mut seller = self.seller.into_iter();
        let mut route_name = self.route_name.into_iter();
        let mut service_title = self.service_title.into_iter();
        let mut returned = self.returned.into_iter();
        let mut status = self.status.into_iter();
        let mut outcome_status = self.outcome_status.into_iter();
        let mut date = self.date.into_iter();
        let mut competence = self.competence.into_iter();

        let mut rows = Vec::new();
        while let Some(invoice_timestamp) = invoice.next() {
            rows.push(DeliveryRecord {
                order_timestamp: order.next().flatten(),
                invoice_timestamp,
                route_assigned_timestamp: route_assigned.next().flatten(),
                arrived_timestamp: arrived.next().flatten(),
                completed_timestamp: completed.next().flatten(),
                invoice_value: invoice_value.next().unwrap_or(f64::NAN),
                freight_value: freight_value.next().unwrap_or(f64::NAN),
                zone: zone.next().flatten(),
                rider: rider.next().flatten(),
                client: client.next().flatten(),
                seller: seller.next().flatten(),
                route_name: route_name.next().flatten(),
                service_title: service_title.next().flatten(),
                returned: returned.next().flatten(),
                status: status.next().flatten(),
                outcome_status: outcome_status.next().flatten(),
                date: date.next().flatten(),
                competence: competence.next().flatten(),
            });
        }
        rows
    }
}

fn io_err(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

pub fn encode(rows: &[DeliveryRecord]) -> Result<Vec<u8>, CacheError> {
    let payload = bincode::serialize(&DeliveryColumns::from_rows(rows))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn decode(bytes: &[u8], origin: &str) -> Result<Vec<DeliveryRecord>, CacheError> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(CacheError::BadMagic(origin.to_string()));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..HEADER_LEN]);
    let found = u32::from_le_bytes(version);
    if found != VERSION {
        return Err(CacheError::VersionMismatch {
            expected: VERSION,
            found,
        });
    }
    let columns: DeliveryColumns = bincode::deserialize(&bytes[HEADER_LEN..])?;
    if !columns.is_rectangular() {
        return Err(CacheError::Codec(Box::new(bincode::ErrorKind::Custom(
            "columns have different lengths".to_string(),
        ))));
    }
    Ok(columns.into_rows())
}

/// `<path>.<pid>.<nanos>.tmp`: concurrent writers never share a temp file.
fn temp_sibling(path: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}.{}.tmp", std::process::id(), nanos));
    PathBuf::from(name)
}

/// Replaces the cache at `path` with `rows`.
pub fn write_cache(path: &Path, rows: &[DeliveryRecord]) -> Result<(), CacheError> {
    let bytes = encode(rows)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let tmp = temp_sibling(path);

    if let Err(e) = std::fs::write(&tmp, &bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&tmp, e));
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    info!(path = %path.display(), rows = rows.len(), bytes = bytes.len(), "Cache written");
    Ok(())
}

pub fn read_cache(path: &Path) -> Result<Vec<DeliveryRecord>, CacheError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let rows = decode(&bytes, &path.display().to_string())?;
    debug!(path = %path.display(), rows = rows.len(), "Cache read");
    Ok(rows)
}
