//! SurrealDB implementation of [`DomainRepository`].
//!
//! A domain is stored as one `domain` row, one `idm_domain` row sharing
//! its record id, and `ca_cert` / `server` / `location` rows pointing at
//! it through `domain_id`. Every statement filters on `org_id`. Writes
//! run as a single transaction whose guards `THROW` a prefixed message
//! that [`check_tx`] turns back into a typed error.

use chrono::{DateTime, Utc};
use idmsvc_core::error::IdmsvcResult;
use idmsvc_core::models::domain::{
    CaCert, CreateDomain, Domain, DomainFilter, DomainType, IdmDomain, Location, Server,
    UpdateAgentDomain, UpdateDomainUser,
};
use idmsvc_core::repository::{DomainRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use crate::error::{BAD_INPUT, CONFLICT, DbError, FORBIDDEN, NOT_FOUND, check_tx};

// -----------------------------------------------------------------------
// Rows
// -----------------------------------------------------------------------

#[derive(Debug, SurrealValue)]
struct DomainRowWithId {
    record_id: String,
    org_id: String,
    domain_name: String,
    domain_type: String,
    title: Option<String>,
    description: Option<String>,
    auto_enrollment_enabled: Option<bool>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DomainRowWithId {
    fn try_into_domain(self, rhel_idm: Option<IdmDomain>) -> Result<Domain, DbError> {
        let domain_uuid = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Corrupt(format!("invalid domain UUID: {e}")))?;
        let domain_type = self
            .domain_type
            .parse::<DomainType>()
            .map_err(|e| DbError::Corrupt(e.to_string()))?;
        Ok(Domain {
            domain_uuid,
            org_id: self.org_id,
            domain_name: self.domain_name,
            domain_type,
            title: self.title,
            description: self.description,
            auto_enrollment_enabled: self.auto_enrollment_enabled,
            rhel_idm,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct IdmDomainRow {
    realm_name: String,
    realm_domains: Vec<String>,
}

#[derive(Debug, SurrealValue)]
struct CaCertRecord {
    org_id: String,
    domain_id: String,
    position: i64,
    nickname: String,
    issuer: String,
    subject: String,
    serial_number: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    pem: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct ServerRecord {
    org_id: String,
    domain_id: String,
    position: i64,
    fqdn: String,
    subscription_manager_id: Option<String>,
    live_rhsm_id: Option<String>,
    location: Option<String>,
    ca_server: bool,
    hcc_enrollment_server: bool,
    hcc_update_server: bool,
    pkinit_server: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct LocationRecord {
    org_id: String,
    domain_id: String,
    position: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

#[derive(Debug, SurrealValue)]
struct OrgRow {
    #[allow(dead_code)]
    org_id: String,
}

/// Child rows of one realm, ready for `INSERT INTO`.
struct ChildRecords {
    ca_certs: Vec<CaCertRecord>,
    servers: Vec<ServerRecord>,
    locations: Vec<LocationRecord>,
}

impl ChildRecords {
    fn new(org_id: &str, domain_id: &str, idm: &IdmDomain, now: DateTime<Utc>) -> Self {
        let ca_certs = idm
            .ca_certs
            .iter()
            .enumerate()
            .map(|(i, c)| CaCertRecord {
                org_id: org_id.into(),
                domain_id: domain_id.into(),
                position: i as i64,
                nickname: c.nickname.clone(),
                issuer: c.issuer.clone(),
                subject: c.subject.clone(),
                serial_number: c.serial_number.clone(),
                not_before: c.not_before,
                not_after: c.not_after,
                pem: c.pem.clone(),
                created_at: now,
                updated_at: now,
            })
            .collect();
        let servers = idm
            .servers
            .iter()
            .enumerate()
            .map(|(i, s)| ServerRecord {
                org_id: org_id.into(),
                domain_id: domain_id.into(),
                position: i as i64,
                fqdn: s.fqdn.clone(),
                subscription_manager_id: s.subscription_manager_id.map(|id| id.to_string()),
                live_rhsm_id: s.subscription_manager_id.map(|id| id.to_string()),
                location: s.location.clone(),
                ca_server: s.ca_server,
                hcc_enrollment_server: s.hcc_enrollment_server,
                hcc_update_server: s.hcc_update_server,
                pkinit_server: s.pkinit_server,
                created_at: now,
                updated_at: now,
            })
            .collect();
        let locations = idm
            .locations
            .iter()
            .enumerate()
            .map(|(i, l)| LocationRecord {
                org_id: org_id.into(),
                domain_id: domain_id.into(),
                position: i as i64,
                name: l.name.clone(),
                description: l.description.clone(),
                created_at: now,
                updated_at: now,
            })
            .collect();
        Self {
            ca_certs,
            servers,
            locations,
        }
    }

    /// `INSERT` statements for the non-empty child lists.
    fn insert_sql(&self) -> String {
        let mut sql = String::new();
        if !self.ca_certs.is_empty() {
            sql.push_str("INSERT INTO ca_cert $ca_certs;\n");
        }
        if !self.servers.is_empty() {
            sql.push_str("INSERT INTO server $servers;\n");
        }
        if !self.locations.is_empty() {
            sql.push_str("INSERT INTO location $locations;\n");
        }
        sql
    }

    fn subscription_manager_ids(&self) -> Vec<String> {
        self.servers
            .iter()
            .filter_map(|s| s.subscription_manager_id.clone())
            .collect()
    }
}

fn ca_cert_from(r: CaCertRecord) -> CaCert {
    CaCert {
        nickname: r.nickname,
        issuer: r.issuer,
        subject: r.subject,
        serial_number: r.serial_number,
        not_before: r.not_before,
        not_after: r.not_after,
        pem: r.pem,
    }
}

fn server_from(r: ServerRecord) -> Result<Server, DbError> {
    let subscription_manager_id = r
        .subscription_manager_id
        .as_deref()
        .map(Uuid::parse_str)
        .transpose()
        .map_err(|e| DbError::Corrupt(format!("invalid subscription manager UUID: {e}")))?;
    Ok(Server {
        fqdn: r.fqdn,
        subscription_manager_id,
        location: r.location,
        ca_server: r.ca_server,
        hcc_enrollment_server: r.hcc_enrollment_server,
        hcc_update_server: r.hcc_update_server,
        pkinit_server: r.pkinit_server,
    })
}

fn location_from(r: LocationRecord) -> Location {
    Location {
        name: r.name,
        description: r.description,
    }
}

// -----------------------------------------------------------------------
// Repository
// -----------------------------------------------------------------------

/// SurrealDB implementation of the Domain repository.
#[derive(Clone)]
pub struct SurrealDomainRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealDomainRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn load(&self, org_id: &str, domain_uuid: Uuid) -> Result<Domain, DbError> {
        let id_str = domain_uuid.to_string();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('domain', $id) \
                 WHERE org_id = $org_id AND deleted_at IS NONE;
                 SELECT * FROM type::record('idm_domain', $id) \
                 WHERE org_id = $org_id AND deleted_at IS NONE;
                 SELECT * FROM ca_cert \
                 WHERE domain_id = $id AND org_id = $org_id AND deleted_at IS NONE \
                 ORDER BY position ASC;
                 SELECT * FROM server \
                 WHERE domain_id = $id AND org_id = $org_id AND deleted_at IS NONE \
                 ORDER BY position ASC;
                 SELECT * FROM location \
                 WHERE domain_id = $id AND org_id = $org_id AND deleted_at IS NONE \
                 ORDER BY position ASC;",
            )
            .bind(("id", id_str.clone()))
            .bind(("org_id", org_id.to_string()))
            .await?;

        let rows: Vec<DomainRowWithId> = result.take(0)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "domain".into(),
            id: id_str.clone(),
        })?;

        let idm_rows: Vec<IdmDomainRow> = result.take(1)?;
        let ca_rows: Vec<CaCertRecord> = result.take(2)?;
        let server_rows: Vec<ServerRecord> = result.take(3)?;
        let location_rows: Vec<LocationRecord> = result.take(4)?;

        let rhel_idm = match idm_rows.into_iter().next() {
            Some(idm) => Some(IdmDomain {
                realm_name: idm.realm_name,
                realm_domains: idm.realm_domains,
                ca_certs: ca_rows.into_iter().map(ca_cert_from).collect(),
                servers: server_rows
                    .into_iter()
                    .map(server_from)
                    .collect::<Result<Vec<_>, _>>()?,
                locations: location_rows.into_iter().map(location_from).collect(),
            }),
            None if row.domain_type == DomainType::RhelIdm.as_str() => {
                return Err(DbError::Corrupt(format!(
                    "domain '{id_str}' has no realm data"
                )));
            }
            None => None,
        };

        row.try_into_domain(rhel_idm)
    }
}

impl<C: Connection> DomainRepository for SurrealDomainRepository<C> {
    async fn list(
        &self,
        org_id: &str,
        pagination: Pagination,
    ) -> IdmsvcResult<PaginatedResult<Domain>> {
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM domain \
                 WHERE org_id = $org_id AND deleted_at IS NONE GROUP ALL",
            )
            .bind(("org_id", org_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM domain \
                 WHERE org_id = $org_id AND deleted_at IS NONE \
                 ORDER BY created_at ASC, record_id ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("org_id", org_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DomainRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_domain(None))
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn find_by_uuid(&self, org_id: &str, domain_uuid: Uuid) -> IdmsvcResult<Domain> {
        self.load(org_id, domain_uuid).await.map_err(Into::into)
    }

    async fn find_candidates(
        &self,
        org_id: &str,
        filter: &DomainFilter,
    ) -> IdmsvcResult<Vec<Domain>> {
        let mut sql = String::from(
            "SELECT meta::id(id) AS record_id, * FROM domain \
             WHERE org_id = $org_id AND deleted_at IS NONE",
        );
        if filter.domain_uuid.is_some() {
            sql.push_str(" AND meta::id(id) = $domain_id");
        }
        if filter.domain_name.is_some() {
            sql.push_str(" AND domain_name = $domain_name");
        }
        if filter.domain_type.is_some() {
            sql.push_str(" AND domain_type = $domain_type");
        }
        sql.push_str(" ORDER BY created_at ASC, record_id ASC");

        let mut result = self
            .db
            .query(sql)
            .bind(("org_id", org_id.to_string()))
            .bind((
                "domain_id",
                filter.domain_uuid.map(|u| u.to_string()).unwrap_or_default(),
            ))
            .bind(("domain_name", filter.domain_name.clone().unwrap_or_default()))
            .bind((
                "domain_type",
                filter
                    .domain_type
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_default(),
            ))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DomainRowWithId> = result.take(0).map_err(DbError::from)?;
        debug!(org_id, candidates = rows.len(), "Loaded match candidates");
        rows.into_iter()
            .map(|row| row.try_into_domain(None))
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }

    async fn register(&self, org_id: &str, input: CreateDomain) -> IdmsvcResult<Domain> {
        let now = Utc::now();
        let id_str = input.domain_uuid.to_string();
        let children = ChildRecords::new(org_id, &id_str, &input.rhel_idm, now);

        let sql = format!(
            "BEGIN TRANSACTION;
             IF array::len((SELECT VALUE meta::id(id) \
                 FROM type::record('domain', $id))) > 0 {{ THROW $dup_msg; }};
             IF array::len((SELECT VALUE meta::id(id) FROM server \
                 WHERE live_rhsm_id IN $rhsm_ids)) > 0 {{ THROW $rhsm_msg; }};
             CREATE type::record('domain', $id) SET \
                 org_id = $org_id, domain_name = $domain_name, \
                 domain_type = $domain_type, title = $title, \
                 description = $description, \
                 auto_enrollment_enabled = false, \
                 created_at = $now, updated_at = $now;
             CREATE type::record('idm_domain', $id) SET \
                 org_id = $org_id, domain_id = $id, \
                 realm_name = $realm_name, realm_domains = $realm_domains, \
                 created_at = $now, updated_at = $now;
             {inserts}
             COMMIT TRANSACTION;",
            inserts = children.insert_sql(),
        );

        let mut response = self
            .db
            .query(sql)
            .bind(("id", id_str.clone()))
            .bind(("org_id", org_id.to_string()))
            .bind(("domain_name", input.domain_name))
            .bind(("domain_type", input.domain_type.as_str().to_string()))
            .bind(("title", input.title))
            .bind(("description", input.description))
            .bind(("realm_name", input.rhel_idm.realm_name.clone()))
            .bind(("realm_domains", input.rhel_idm.realm_domains.clone()))
            .bind(("now", now))
            .bind(("rhsm_ids", children.subscription_manager_ids()))
            .bind((
                "dup_msg",
                format!("{CONFLICT} domain id '{id_str}' is already registered."),
            ))
            .bind((
                "rhsm_msg",
                format!("{CONFLICT} a subscription manager id is already used by another server"),
            ))
            .bind(("ca_certs", children.ca_certs))
            .bind(("servers", children.servers))
            .bind(("locations", children.locations))
            .await
            .map_err(DbError::from)?;
        check_tx(response.take_errors(), "domain", &id_str)?;

        self.load(org_id, input.domain_uuid)
            .await
            .map_err(Into::into)
    }

    async fn update_agent(
        &self,
        org_id: &str,
        domain_uuid: Uuid,
        caller: Uuid,
        input: UpdateAgentDomain,
    ) -> IdmsvcResult<Domain> {
        let now = Utc::now();
        let id_str = domain_uuid.to_string();
        let children = ChildRecords::new(org_id, &id_str, &input.rhel_idm, now);

        // Preconditions are evaluated against the rows this transaction
        // commits on top of.
        let sql = format!(
            "BEGIN TRANSACTION;
             LET $current = (SELECT * FROM type::record('domain', $id) \
                 WHERE org_id = $org_id AND deleted_at IS NONE)[0];
             IF $current IS NONE {{ THROW $missing_msg; }};
             LET $realm = (SELECT * FROM type::record('idm_domain', $id) \
                 WHERE deleted_at IS NONE)[0];
             IF $realm IS NONE {{ THROW 'realm data is missing'; }};
             IF array::len((SELECT VALUE meta::id(id) FROM server \
                 WHERE domain_id = $id AND deleted_at IS NONE \
                 AND hcc_update_server = true \
                 AND subscription_manager_id = $caller)) = 0 {{ THROW $forbidden_msg; }};
             IF $current.domain_name != $domain_name {{ THROW $name_msg; }};
             IF $current.domain_type != $domain_type {{ THROW $type_msg; }};
             IF $realm.realm_name != $realm_name {{ THROW $realm_msg; }};
             IF array::len((SELECT VALUE meta::id(id) FROM server \
                 WHERE domain_id != $id \
                 AND live_rhsm_id IN $rhsm_ids)) > 0 {{ THROW $rhsm_msg; }};
             DELETE ca_cert WHERE domain_id = $id;
             DELETE server WHERE domain_id = $id;
             DELETE location WHERE domain_id = $id;
             UPDATE type::record('idm_domain', $id) SET \
                 realm_domains = $realm_domains, updated_at = $now;
             UPDATE type::record('domain', $id) SET updated_at = $now;
             {inserts}
             COMMIT TRANSACTION;",
            inserts = children.insert_sql(),
        );

        let mut response = self
            .db
            .query(sql)
            .bind(("id", id_str.clone()))
            .bind(("org_id", org_id.to_string()))
            .bind(("caller", caller.to_string()))
            .bind(("domain_name", input.domain_name))
            .bind(("domain_type", input.domain_type.as_str().to_string()))
            .bind(("realm_name", input.rhel_idm.realm_name.clone()))
            .bind(("realm_domains", input.rhel_idm.realm_domains.clone()))
            .bind(("now", now))
            .bind(("rhsm_ids", children.subscription_manager_ids()))
            .bind(("missing_msg", NOT_FOUND.to_string()))
            .bind((
                "forbidden_msg",
                format!("{FORBIDDEN} '{caller}' is not an update server of domain '{id_str}'"),
            ))
            .bind(("name_msg", format!("{BAD_INPUT} 'domain_name' may not be changed")))
            .bind(("type_msg", format!("{BAD_INPUT} 'domain_type' may not be changed")))
            .bind(("realm_msg", format!("{BAD_INPUT} 'realm_name' may not be changed")))
            .bind((
                "rhsm_msg",
                format!("{CONFLICT} a subscription manager id is already used by another domain"),
            ))
            .bind(("ca_certs", children.ca_certs))
            .bind(("servers", children.servers))
            .bind(("locations", children.locations))
            .await
            .map_err(DbError::from)?;
        check_tx(response.take_errors(), "domain", &id_str)?;

        self.load(org_id, domain_uuid).await.map_err(Into::into)
    }

    async fn update_user(
        &self,
        org_id: &str,
        domain_uuid: Uuid,
        input: UpdateDomainUser,
    ) -> IdmsvcResult<Domain> {
        let id_str = domain_uuid.to_string();

        let mut sets = vec!["updated_at = $now"];
        if input.title.is_some() {
            sets.push("title = $title");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.auto_enrollment_enabled.is_some() {
            sets.push("auto_enrollment_enabled = $auto_enrollment_enabled");
        }
        let sql = format!(
            "UPDATE type::record('domain', $id) SET {} \
             WHERE org_id = $org_id AND deleted_at IS NONE",
            sets.join(", ")
        );

        let result = self
            .db
            .query(sql)
            .bind(("id", id_str.clone()))
            .bind(("org_id", org_id.to_string()))
            .bind(("now", Utc::now()))
            .bind(("title", input.title))
            .bind(("description", input.description))
            .bind(("auto_enrollment_enabled", input.auto_enrollment_enabled))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<OrgRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "domain".into(),
                id: id_str,
            }
            .into());
        }

        self.load(org_id, domain_uuid).await.map_err(Into::into)
    }

    async fn delete_by_uuid(&self, org_id: &str, domain_uuid: Uuid) -> IdmsvcResult<()> {
        let id_str = domain_uuid.to_string();

        let mut response = self
            .db
            .query(
                "BEGIN TRANSACTION;
                 IF array::len((SELECT VALUE meta::id(id) \
                     FROM type::record('domain', $id) \
                     WHERE org_id = $org_id AND deleted_at IS NONE)) = 0 \
                     { THROW $missing_msg; };
                 UPDATE type::record('domain', $id) \
                     SET deleted_at = $now, updated_at = $now;
                 UPDATE type::record('idm_domain', $id) \
                     SET deleted_at = $now, updated_at = $now;
                 UPDATE ca_cert SET deleted_at = $now, updated_at = $now \
                     WHERE domain_id = $id AND deleted_at IS NONE;
                 UPDATE server SET deleted_at = $now, updated_at = $now, \
                     live_rhsm_id = NONE \
                     WHERE domain_id = $id AND deleted_at IS NONE;
                 UPDATE location SET deleted_at = $now, updated_at = $now \
                     WHERE domain_id = $id AND deleted_at IS NONE;
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id_str.clone()))
            .bind(("org_id", org_id.to_string()))
            .bind(("now", Utc::now()))
            .bind(("missing_msg", NOT_FOUND.to_string()))
            .await
            .map_err(DbError::from)?;
        check_tx(response.take_errors(), "domain", &id_str)?;

        Ok(())
    }
}
