use anyhow::{Context, Result};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, Set, Statement, TransactionTrait,
};
use tracing::{debug, info};

use super::role::ensure_role;
use crate::domain::{RequestMethod, to_marker};
use crate::entities::{prelude::*, request_names, request_roles, requests};

/// One routable page or form target in the fixed catalog.
#[derive(Debug, Clone)]
pub struct RequestSeed {
    pub method: RequestMethod,
    pub url: &'static str,
    /// `(method, url)` of the section this request inherits grants from.
    pub parent: Option<(RequestMethod, &'static str)>,
    pub template: Option<&'static str>,
    pub controller: &'static str,
    pub action: Option<&'static str>,
    pub success_url: Option<&'static str>,
    pub error_url: Option<&'static str>,
    pub names: &'static [(&'static str, &'static str)],
    pub roles: &'static [&'static str],
    pub sort_order: i32,
    pub in_menu: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub requests_added: u64,
    pub grants_added: u64,
    pub inherited_grants: u64,
    pub catch_all_grants: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleCounts {
    pub requests: u64,
    pub names: u64,
    pub grants: u64,
}

/// Persisted rule reachable by an identity, still in stored (`-` marker) form.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct ResolvedRow {
    pub id: i32,
    pub method: String,
    pub url: String,
    pub template: String,
    pub controller: String,
    pub action: String,
    pub success_url: String,
    pub error_url: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct ActionRef {
    pub controller: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult, serde::Serialize)]
pub struct MenuEntry {
    pub url: String,
    pub display_name: String,
}

const RESOLVE_SQL: &str = r"
SELECT r.id, r.method, r.url, r.template, r.controller, r.action,
       r.success_url, r.error_url,
       COALESCE(n.name, b.name, r.url) AS display_name
FROM requests r
LEFT JOIN request_names n ON n.request_id = r.id AND n.language = ?
LEFT JOIN request_names b ON b.request_id = r.id AND b.language = ?
WHERE r.url = ?
  AND (r.method = ? OR r.method = '*')
  AND EXISTS (
    SELECT 1 FROM request_roles rr
    JOIN roles ro ON ro.id = rr.role_id
    WHERE rr.request_id = r.id
      AND (ro.lowered_name = ?
           OR rr.role_id IN (
             SELECT ur.role_id FROM user_roles ur
             JOIN users u ON u.id = ur.user_id
             WHERE u.lowered_username = ?
               AND ur.valid_from <= ?
               AND (ur.valid_until IS NULL OR ur.valid_until > ?)))
  )
ORDER BY CASE WHEN r.method = '*' THEN 1 ELSE 0 END
LIMIT 1";

const MENU_SQL: &str = r"
SELECT r.url, COALESCE(n.name, b.name, r.url) AS display_name
FROM requests r
LEFT JOIN request_names n ON n.request_id = r.id AND n.language = ?
LEFT JOIN request_names b ON b.request_id = r.id AND b.language = ?
WHERE r.in_menu = 1
  AND r.method = 'GET'
  AND EXISTS (
    SELECT 1 FROM request_roles rr
    JOIN roles ro ON ro.id = rr.role_id
    WHERE rr.request_id = r.id
      AND (ro.lowered_name = ?
           OR rr.role_id IN (
             SELECT ur.role_id FROM user_roles ur
             JOIN users u ON u.id = ur.user_id
             WHERE u.lowered_username = ?
               AND ur.valid_from <= ?
               AND (ur.valid_until IS NULL OR ur.valid_until > ?)))
  )
ORDER BY r.sort_order, r.id";

/// Copy every grant of a parent request onto its children that lack it.
const INHERIT_SQL: &str = r"
INSERT INTO request_roles (request_id, role_id)
SELECT c.id, pr.role_id
FROM requests c
JOIN request_roles pr ON pr.request_id = c.parent_id
WHERE NOT EXISTS (
  SELECT 1 FROM request_roles x
  WHERE x.request_id = c.id AND x.role_id = pr.role_id
)";

/// Grant the baseline role to every request that has no grant at all.
const CATCH_ALL_SQL: &str = r"
INSERT INTO request_roles (request_id, role_id)
SELECT r.id, ?
FROM requests r
WHERE NOT EXISTS (SELECT 1 FROM request_roles rr WHERE rr.request_id = r.id)";

/// Who the rule lookup runs for.
#[derive(Debug, Clone)]
pub struct ResolveQuery<'a> {
    pub username: Option<&'a str>,
    pub universal_role: &'a str,
    pub language: &'a str,
    pub base_language: &'a str,
    pub as_of: &'a str,
}

/// Access rule table: requests, their display names and role grants.
pub struct RequestRepository {
    conn: DatabaseConnection,
}

impl RequestRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Insert-if-absent seeding of the whole catalog in one transaction.
    ///
    /// Order: requests, roles, explicit grants, parent-to-child inheritance,
    /// then the catch-all grant for anything still ungranted. Existing rows are
    /// never updated.
    pub async fn seed(
        &self,
        catalog: &[RequestSeed],
        role_names: &[&str],
        catch_all_role: &str,
    ) -> Result<SeedReport> {
        let txn = self.conn.begin().await?;
        let mut report = SeedReport::default();

        for entry in catalog {
            let (id, inserted) = ensure_request(&txn, entry)
                .await
                .with_context(|| format!("Failed to seed {} {}", entry.method, entry.url))?;
            if inserted {
                report.requests_added += 1;
            }
            ensure_names(&txn, id, entry.names).await?;
        }

        // Parents may come later in the catalog than their children.
        for entry in catalog {
            if let Some((method, url)) = entry.parent {
                link_parent(&txn, entry, method, url).await?;
            }
        }

        for name in role_names {
            ensure_role(&txn, name).await?;
        }

        for entry in catalog {
            let request = find_request(&txn, entry.method, entry.url).await?;
            for role_name in entry.roles {
                let role = ensure_role(&txn, role_name).await?;
                if ensure_grant(&txn, request.id, role.id).await? {
                    report.grants_added += 1;
                }
            }
        }

        report.inherited_grants = inherit_parent_grants(&txn).await?;

        let baseline = ensure_role(&txn, catch_all_role).await?;
        let backend = txn.get_database_backend();
        report.catch_all_grants = txn
            .execute(Statement::from_sql_and_values(
                backend,
                CATCH_ALL_SQL,
                [baseline.id.into()],
            ))
            .await
            .context("Failed to apply catch-all grant")?
            .rows_affected();

        txn.commit().await?;

        info!(
            requests_added = report.requests_added,
            grants_added = report.grants_added,
            inherited_grants = report.inherited_grants,
            catch_all_grants = report.catch_all_grants,
            "Access rules seeded"
        );

        Ok(report)
    }

    pub async fn resolve(
        &self,
        method: RequestMethod,
        url: &str,
        query: &ResolveQuery<'_>,
    ) -> Result<Option<ResolvedRow>> {
        let backend = self.conn.get_database_backend();
        let username = query.username.map(str::to_lowercase);

        ResolvedRow::find_by_statement(Statement::from_sql_and_values(
            backend,
            RESOLVE_SQL,
            [
                query.language.into(),
                query.base_language.into(),
                url.into(),
                method.as_str().into(),
                query.universal_role.to_lowercase().into(),
                username.into(),
                query.as_of.into(),
                query.as_of.into(),
            ],
        ))
        .one(&self.conn)
        .await
        .context("Failed to resolve request")
    }

    /// Menu pages visible to the identity, in display order.
    pub async fn menu(&self, query: &ResolveQuery<'_>) -> Result<Vec<MenuEntry>> {
        let backend = self.conn.get_database_backend();
        let username = query.username.map(str::to_lowercase);

        MenuEntry::find_by_statement(Statement::from_sql_and_values(
            backend,
            MENU_SQL,
            [
                query.language.into(),
                query.base_language.into(),
                query.universal_role.to_lowercase().into(),
                username.into(),
                query.as_of.into(),
                query.as_of.into(),
            ],
        ))
        .all(&self.conn)
        .await
        .context("Failed to load menu")
    }

    /// Distinct (controller, action) pairs referenced by stored rules.
    pub async fn referenced_actions(&self) -> Result<Vec<ActionRef>> {
        let backend = self.conn.get_database_backend();

        ActionRef::find_by_statement(Statement::from_string(
            backend,
            "SELECT DISTINCT controller, action FROM requests WHERE action <> '-' ORDER BY controller, action",
        ))
        .all(&self.conn)
        .await
        .context("Failed to list referenced actions")
    }

    pub async fn counts(&self) -> Result<RuleCounts> {
        Ok(RuleCounts {
            requests: Requests::find().count(&self.conn).await?,
            names: RequestNames::find().count(&self.conn).await?,
            grants: RequestRoles::find().count(&self.conn).await?,
        })
    }

    /// Role names granted on a request, sorted.
    pub async fn granted_roles(&self, method: RequestMethod, url: &str) -> Result<Vec<String>> {
        let Some(request) = Requests::find()
            .filter(requests::Column::Method.eq(method.as_str()))
            .filter(requests::Column::Url.eq(url))
            .one(&self.conn)
            .await?
        else {
            return Ok(Vec::new());
        };

        let names = Roles::find()
            .inner_join(RequestRoles)
            .filter(request_roles::Column::RequestId.eq(request.id))
            .order_by_asc(crate::entities::roles::Column::Name)
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();
        Ok(names)
    }
}

async fn find_request<C: ConnectionTrait>(
    db: &C,
    method: RequestMethod,
    url: &str,
) -> Result<requests::Model, DbErr> {
    Requests::find()
        .filter(requests::Column::Method.eq(method.as_str()))
        .filter(requests::Column::Url.eq(url))
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("request {method} {url}")))
}

/// Returns the request id and whether a row was inserted.
async fn ensure_request(txn: &DatabaseTransaction, entry: &RequestSeed) -> Result<(i32, bool), DbErr> {
    let inserted = Requests::insert(requests::ActiveModel {
        method: Set(entry.method.as_str().to_string()),
        url: Set(entry.url.to_string()),
        parent_id: Set(None),
        template: Set(to_marker(entry.template)),
        controller: Set(entry.controller.to_string()),
        action: Set(to_marker(entry.action)),
        success_url: Set(to_marker(entry.success_url)),
        error_url: Set(to_marker(entry.error_url)),
        sort_order: Set(entry.sort_order),
        in_menu: Set(entry.in_menu),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::columns([requests::Column::Method, requests::Column::Url])
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(txn)
    .await?;

    let request = find_request(txn, entry.method, entry.url).await?;
    if inserted > 0 {
        debug!(method = %entry.method, url = entry.url, "Seeded request");
    }
    Ok((request.id, inserted > 0))
}

async fn ensure_names(
    txn: &DatabaseTransaction,
    request_id: i32,
    names: &[(&str, &str)],
) -> Result<(), DbErr> {
    for (language, name) in names {
        RequestNames::insert(request_names::ActiveModel {
            request_id: Set(request_id),
            language: Set((*language).to_string()),
            name: Set((*name).to_string()),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([
                request_names::Column::RequestId,
                request_names::Column::Language,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(txn)
        .await?;
    }
    Ok(())
}

/// Set the parent link only on rows that have none yet.
async fn link_parent(
    txn: &DatabaseTransaction,
    entry: &RequestSeed,
    parent_method: RequestMethod,
    parent_url: &str,
) -> Result<(), DbErr> {
    let parent = find_request(txn, parent_method, parent_url).await?;
    let child = find_request(txn, entry.method, entry.url).await?;

    if child.parent_id.is_none() {
        Requests::update_many()
            .col_expr(
                requests::Column::ParentId,
                sea_orm::sea_query::Expr::value(parent.id),
            )
            .filter(requests::Column::Id.eq(child.id))
            .exec(txn)
            .await?;
    }
    Ok(())
}

async fn ensure_grant(txn: &DatabaseTransaction, request_id: i32, role_id: i32) -> Result<bool, DbErr> {
    let inserted = RequestRoles::insert(request_roles::ActiveModel {
        request_id: Set(request_id),
        role_id: Set(role_id),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::columns([
            request_roles::Column::RequestId,
            request_roles::Column::RoleId,
        ])
        .do_nothing()
        .to_owned(),
    )
    .exec_without_returning(txn)
    .await?;

    Ok(inserted > 0)
}

/// Repeat inheritance until no grant is added, so grandchildren pick up
/// grants their parent only just inherited.
async fn inherit_parent_grants(txn: &DatabaseTransaction) -> Result<u64> {
    let backend = txn.get_database_backend();
    let mut total = 0;

    loop {
        let added = txn
            .execute(Statement::from_string(backend, INHERIT_SQL))
            .await
            .context("Failed to propagate parent grants")?
            .rows_affected();
        if added == 0 {
            break;
        }
        total += added;
    }

    Ok(total)
}
