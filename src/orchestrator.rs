use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use anyhow::Result;
use log::{info, warn};

use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::StageError;
use crate::ip::IpEcho;
use crate::provider::CloudflareClient;

/// Identifies a record for selection. Names alone are ambiguous across zones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordKey {
    pub zone_id: String,
    pub name: String,
}

impl RecordKey {
    pub fn new(zone_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub domain: String,
    pub zone_id: String,
    pub name: String,
    pub id: String,
}

impl RecordEntry {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.zone_id, &self.name)
    }
}

#[derive(Debug, Clone)]
struct ZoneRecords {
    domain: String,
    zone_id: String,
    records: BTreeMap<String, String>,
}

/// Records gathered from the selected domains, grouped by zone in selection order.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    zones: Vec<ZoneRecords>,
}

impl RecordSet {
    pub(crate) fn push(
        &mut self,
        domain: &str,
        zone_id: String,
        records: BTreeMap<String, String>,
    ) {
        self.zones.push(ZoneRecords {
            domain: domain.to_string(),
            zone_id,
            records,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.zones.iter().all(|zone| zone.records.is_empty())
    }

    pub fn len(&self) -> usize {
        self.zones.iter().map(|zone| zone.records.len()).sum()
    }

    pub fn entries(&self) -> impl Iterator<Item = RecordEntry> + '_ {
        self.zones.iter().flat_map(|zone| {
            zone.records.iter().map(move |(name, id)| RecordEntry {
                domain: zone.domain.clone(),
                zone_id: zone.zone_id.clone(),
                name: name.clone(),
                id: id.clone(),
            })
        })
    }

    pub fn find(&self, key: &RecordKey) -> Option<RecordEntry> {
        let zone = self.zones.iter().find(|zone| zone.zone_id == key.zone_id)?;
        let id = zone.records.get(&key.name)?;
        Some(RecordEntry {
            domain: zone.domain.clone(),
            zone_id: zone.zone_id.clone(),
            name: key.name.clone(),
            id: id.clone(),
        })
    }
}

/// Everything the operator has supplied so far. Each stage fills in its part
/// and clears whatever later stages derived from the previous value.
#[derive(Debug, Default)]
pub struct Session {
    pub credentials: Option<Credentials>,
    pub domains: Vec<String>,
    pub selected_domains: Vec<String>,
    pub records: RecordSet,
    pub selected_records: Vec<RecordEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub ip: String,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub dry_run: bool,
}

impl UpdateReport {
    fn new(ip: String, dry_run: bool) -> Self {
        Self {
            ip,
            updated: 0,
            unchanged: 0,
            failed: 0,
            dry_run,
        }
    }
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.updated > 0 {
            let verb = if self.dry_run { "Would update" } else { "Updated" };
            write!(f, "{} {} DNS record(s) to {}", verb, self.updated, self.ip)?;
            if self.unchanged > 0 {
                write!(f, ", {} already up to date", self.unchanged)?;
            }
        } else if self.failed == 0 {
            write!(f, "IP address has not changed. No updates required.")?;
        } else {
            write!(f, "No DNS records were updated to {}", self.ip)?;
        }
        if self.failed > 0 {
            write!(f, " ({} update(s) failed)", self.failed)?;
        }
        Ok(())
    }
}

/// Runs the four stages against Cloudflare and the IP echo service.
pub struct Orchestrator {
    cloudflare: CloudflareClient,
    ip: IpEcho,
    dry_run: bool,
}

impl Orchestrator {
    pub fn new(config: &Config, dry_run: bool) -> Result<Self> {
        Ok(Self {
            cloudflare: CloudflareClient::new(&config.cloudflare)?,
            ip: IpEcho::new(&config.ip)?,
            dry_run,
        })
    }

    pub async fn authenticate(
        &self,
        session: &mut Session,
        creds: Credentials,
    ) -> Result<(), StageError> {
        if !creds.is_complete() {
            return Err(StageError::MissingCredentials);
        }

        let domains = self
            .cloudflare
            .list_domains(&creds)
            .await
            .filter(|domains| !domains.is_empty())
            .ok_or(StageError::InvalidCredentials)?;

        info!("Authenticated as {}, {} domain(s) available", creds.email, domains.len());
        *session = Session {
            credentials: Some(creds),
            domains,
            ..Session::default()
        };
        Ok(())
    }

    /// Resolves each chosen domain to its zone and collects its records.
    /// Domains whose zone or records cannot be fetched are skipped.
    pub async fn select_domains(
        &self,
        session: &mut Session,
        chosen: &[String],
    ) -> Result<(), StageError> {
        let creds = session
            .credentials
            .as_ref()
            .ok_or(StageError::InvalidCredentials)?;

        let mut seen = BTreeSet::new();
        let chosen: Vec<&String> = chosen.iter().filter(|d| seen.insert(*d)).collect();
        if chosen.is_empty() {
            return Err(StageError::NoDomainSelected);
        }
        if let Some(unknown) = chosen.iter().find(|d| !session.domains.contains(**d)) {
            return Err(StageError::UnknownDomain(unknown.to_string()));
        }

        let mut records = RecordSet::default();
        for domain in &chosen {
            let Some(zone_id) = self.cloudflare.resolve_zone(creds, domain).await else {
                warn!("Skipping {}: zone could not be resolved", domain);
                continue;
            };
            match self.cloudflare.list_records(creds, &zone_id).await {
                Some(zone_records) if !zone_records.is_empty() => {
                    records.push(domain, zone_id, zone_records);
                }
                _ => warn!("Skipping {}: no DNS records found", domain),
            }
        }

        if records.is_empty() {
            return Err(StageError::NoRecords);
        }

        info!(
            "Found {} DNS record(s) across {} domain(s)",
            records.len(),
            chosen.len()
        );
        session.selected_domains = chosen.into_iter().cloned().collect();
        session.records = records;
        session.selected_records.clear();
        Ok(())
    }

    pub fn select_records(
        &self,
        session: &mut Session,
        chosen: &[RecordKey],
    ) -> Result<(), StageError> {
        if session.records.is_empty() {
            return Err(StageError::NoRecords);
        }

        let mut seen = BTreeSet::new();
        let mut selected = Vec::new();
        for key in chosen.iter().filter(|key| seen.insert(*key)) {
            let entry = session
                .records
                .find(key)
                .ok_or_else(|| StageError::UnknownRecord {
                    zone_id: key.zone_id.clone(),
                    name: key.name.clone(),
                })?;
            selected.push(entry);
        }

        if selected.is_empty() {
            return Err(StageError::NoRecordSelected);
        }

        session.selected_records = selected;
        Ok(())
    }

    /// Points every selected record at the current external IP.
    ///
    /// The IP is fetched once; without it nothing is written. A record is
    /// written only when its stored value differs from the IP after trimming,
    /// and a value that cannot be read counts as different. One failed write
    /// does not stop the others.
    pub async fn update(&self, session: &Session) -> Result<UpdateReport, StageError> {
        let creds = session
            .credentials
            .as_ref()
            .ok_or(StageError::InvalidCredentials)?;
        if session.selected_records.is_empty() {
            return Err(StageError::NoRecordSelected);
        }

        let current_ip = self
            .ip
            .fetch_external_ip()
            .await
            .ok_or(StageError::NoExternalIp)?;
        let current_ip = current_ip.trim().to_string();

        let mut report = UpdateReport::new(current_ip.clone(), self.dry_run);
        for record in &session.selected_records {
            let previous = self
                .cloudflare
                .read_record_value(creds, &record.zone_id, &record.id)
                .await;

            if previous.as_deref().map(str::trim) == Some(current_ip.as_str()) {
                info!("Record {} already has IP {}, no update needed", record.name, current_ip);
                report.unchanged += 1;
                continue;
            }

            let previous = previous.as_deref().unwrap_or("<unknown>");
            if self.dry_run {
                info!(
                    "Dry run: would update {} from {} to {}",
                    record.name, previous, current_ip
                );
                report.updated += 1;
                continue;
            }

            info!("Updating record {} from {} to {}", record.name, previous, current_ip);
            let written = self
                .cloudflare
                .write_record(creds, &record.zone_id, &record.name, &record.id, &current_ip)
                .await;
            if written {
                report.updated += 1;
            } else {
                report.failed += 1;
            }
        }

        Ok(report)
    }
}
