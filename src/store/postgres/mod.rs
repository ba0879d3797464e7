//! Postgres-backed gateways.
//!
//! Statements are built with `sea_query` and run through a [`SqlExecutor`].
//! Edit locks are two nullable columns on the `part` table
//! (`user_access`, `datetime`). Taking a lock is one conditional `UPDATE`
//! that only matches a free row; whether it matched is read from the rows
//! affected, so two clients racing for the same part cannot both win.

pub mod params;
pub mod rows;
pub mod schema;

use self::params::with_params;
use crate::entity::{Entity, EntityId, InventoryLine, Part};
use crate::error::GatewayError;
use crate::executor::SqlExecutor;
use crate::gateway::{InventoryGateway, LockGateway, LockHolder, TableGateway};
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use may_postgres::Row;
use sea_query::{Expr, ExprTrait, Iden, Order, PostgresQueryBuilder, Query, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// A table or column name
#[derive(Debug, Clone, Copy)]
pub struct Name(pub &'static str);

impl Iden for Name {
    fn unquoted(&self) -> &str {
        self.0
    }
}

pub const ID: Name = Name("id");
pub const USER_ACCESS: Name = Name("user_access");
pub const LOCKED_AT: Name = Name("datetime");

/// Row mapping of an entity kind
pub trait PgEntity: Entity {
    const TABLE: &'static str;

    /// Data columns in the order [`PgEntity::values`] returns them; `id` excluded
    const COLUMNS: &'static [&'static str];

    /// Column holding [`Entity::unique_key`], if the kind has one
    const KEY_COLUMN: Option<&'static str> = None;

    fn values(&self) -> Vec<Value>;

    fn from_row(row: &Row) -> Result<Self, GatewayError>;
}

/// Table gateway for one entity kind
pub struct PgTable<E> {
    executor: Arc<dyn SqlExecutor + Send + Sync>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for PgTable<E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            _entity: PhantomData,
        }
    }
}

impl<E: PgEntity> PgTable<E> {
    pub fn new(executor: Arc<dyn SqlExecutor + Send + Sync>) -> Self {
        Self {
            executor,
            _entity: PhantomData,
        }
    }

    fn table() -> Name {
        Name(E::TABLE)
    }

    fn select_all() -> sea_query::SelectStatement {
        Query::select()
            .column(ID)
            .columns(E::COLUMNS.iter().copied().map(Name))
            .from(Self::table())
            .to_owned()
    }

    fn load(&self, rows: Vec<Row>) -> Result<Vec<E>, GatewayError> {
        rows.iter().map(E::from_row).collect()
    }
}

impl<E: PgEntity> TableGateway<E> for PgTable<E> {
    fn fetch_all(&self) -> Result<Vec<E>, GatewayError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::store_call_span("fetch_all", E::TABLE).entered();

        let (sql, values) = Self::select_all()
            .order_by(ID, Order::Asc)
            .build(PostgresQueryBuilder);
        let rows = with_params(&values, |p| self.executor.query_all(&sql, p))?;
        self.load(rows)
    }

    fn fetch_by_id(&self, id: EntityId) -> Result<E, GatewayError> {
        let (sql, values) = Self::select_all()
            .and_where(Expr::col(ID).eq(id))
            .build(PostgresQueryBuilder);
        let row = with_params(&values, |p| self.executor.query_opt(&sql, p))?;
        match row {
            Some(row) => E::from_row(&row),
            None => Err(GatewayError::NotFound { kind: E::KIND, id }),
        }
    }

    fn insert(&self, entity: &E) -> Result<EntityId, GatewayError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::store_call_span("insert", E::TABLE).entered();

        let exprs: Vec<Expr> = entity.values().into_iter().map(Expr::val).collect();
        let (sql, values) = Query::insert()
            .into_table(Self::table())
            .columns(E::COLUMNS.iter().copied().map(Name))
            .values(exprs)
            .map_err(|e| GatewayError::Store(e.to_string()))?
            .returning_col(ID)
            .build(PostgresQueryBuilder);
        let row = with_params(&values, |p| self.executor.query_one(&sql, p))?;
        row.try_get::<_, i64>(0)
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    fn update(&self, entity: &E) -> Result<(), GatewayError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::store_call_span("update", E::TABLE).entered();

        let mut stmt = Query::update();
        stmt.table(Self::table());
        for (&column, value) in E::COLUMNS.iter().zip(entity.values()) {
            stmt.value(Name(column), Expr::val(value));
        }
        let (sql, values) = stmt
            .and_where(Expr::col(ID).eq(entity.id()))
            .build(PostgresQueryBuilder);
        let affected = with_params(&values, |p| self.executor.execute(&sql, p))?;
        if affected == 0 {
            return Err(GatewayError::Conflict(format!(
                "{} {} no longer exists",
                E::KIND,
                entity.id()
            )));
        }
        Ok(())
    }

    fn delete(&self, id: EntityId) -> Result<(), GatewayError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::store_call_span("delete", E::TABLE).entered();

        let (sql, values) = Query::delete()
            .from_table(Self::table())
            .and_where(Expr::col(ID).eq(id))
            .build(PostgresQueryBuilder);
        let affected = with_params(&values, |p| self.executor.execute(&sql, p))?;
        if affected == 0 {
            return Err(GatewayError::NotFound { kind: E::KIND, id });
        }
        Ok(())
    }

    fn key_exists(&self, key: &str, excluding: EntityId) -> Result<bool, GatewayError> {
        let Some(column) = E::KEY_COLUMN else {
            return Ok(false);
        };
        let (sql, values) = Query::select()
            .column(ID)
            .from(Self::table())
            .and_where(Expr::col(Name(column)).eq(key))
            .and_where(Expr::col(ID).ne(excluding))
            .limit(1)
            .build(PostgresQueryBuilder);
        let row = with_params(&values, |p| self.executor.query_opt(&sql, p))?;
        Ok(row.is_some())
    }
}

impl InventoryGateway for PgTable<InventoryLine> {
    fn fetch_for_warehouse(
        &self,
        warehouse_id: EntityId,
    ) -> Result<Vec<InventoryLine>, GatewayError> {
        let (sql, values) = Self::select_all()
            .and_where(Expr::col(Name("warehouse_id")).eq(warehouse_id))
            .order_by(ID, Order::Asc)
            .build(PostgresQueryBuilder);
        let rows = with_params(&values, |p| self.executor.query_all(&sql, p))?;
        self.load(rows)
    }
}

impl PgTable<Part> {
    fn lock_row(&self, id: EntityId) -> Result<Option<Row>, GatewayError> {
        let (sql, values) = Query::select()
            .columns([USER_ACCESS, LOCKED_AT])
            .from(Self::table())
            .and_where(Expr::col(ID).eq(id))
            .build(PostgresQueryBuilder);
        with_params(&values, |p| self.executor.query_opt(&sql, p))
    }
}

fn holder_from_row(row: &Row) -> Result<Option<LockHolder>, GatewayError> {
    let session: Option<String> = row
        .try_get(0)
        .map_err(|e| GatewayError::Decode(e.to_string()))?;
    let acquired_at: Option<DateTime<Utc>> = row
        .try_get(1)
        .map_err(|e| GatewayError::Decode(e.to_string()))?;
    lock_holder(session, acquired_at)
}

/// Both lock columns are set together or cleared together.
fn lock_holder(
    session: Option<String>,
    acquired_at: Option<DateTime<Utc>>,
) -> Result<Option<LockHolder>, GatewayError> {
    match (session, acquired_at) {
        (None, _) => Ok(None),
        (Some(s), Some(acquired_at)) => Ok(Some(LockHolder {
            session: SessionId::new(s),
            acquired_at,
        })),
        (Some(s), None) => Err(GatewayError::Decode(format!(
            "lock held by {s} has no acquisition time"
        ))),
    }
}

/// Claim a free lock, or grant re-entry to its holder.
///
/// A lock released between the failed claim and the holder read is claimed
/// once more before denying.
fn claim_or_reenter(
    session: &SessionId,
    mut claim: impl FnMut() -> Result<bool, GatewayError>,
    mut holder: impl FnMut() -> Result<Option<LockHolder>, GatewayError>,
) -> Result<bool, GatewayError> {
    for _ in 0..2 {
        if claim()? {
            return Ok(true);
        }
        if let Some(current) = holder()? {
            return Ok(&current.session == session);
        }
    }
    Ok(false)
}

impl LockGateway for PgTable<Part> {
    fn query_lock(&self, id: EntityId) -> Result<Option<LockHolder>, GatewayError> {
        match self.lock_row(id)? {
            Some(row) => holder_from_row(&row),
            None => Err(GatewayError::NotFound {
                kind: Part::KIND,
                id,
            }),
        }
    }

    fn acquire_lock(
        &self,
        id: EntityId,
        session: Option<&SessionId>,
    ) -> Result<bool, GatewayError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::store_call_span("acquire_lock", Part::TABLE).entered();

        let Some(session) = session else {
            let (sql, values) = Query::update()
                .table(Self::table())
                .value(USER_ACCESS, Expr::val(Value::String(None)))
                .value(LOCKED_AT, Expr::cust("NULL"))
                .and_where(Expr::col(ID).eq(id))
                .build(PostgresQueryBuilder);
            let affected = with_params(&values, |p| self.executor.execute(&sql, p))?;
            if affected == 0 {
                return Err(GatewayError::NotFound {
                    kind: Part::KIND,
                    id,
                });
            }
            return Ok(true);
        };

        // Only a free row matches, so at most one session can win the race.
        let (sql, values) = Query::update()
            .table(Self::table())
            .value(USER_ACCESS, Expr::val(session.as_str()))
            .value(LOCKED_AT, Expr::cust("NOW()"))
            .and_where(Expr::col(ID).eq(id))
            .and_where(Expr::col(USER_ACCESS).is_null())
            .build(PostgresQueryBuilder);
        claim_or_reenter(
            session,
            || with_params(&values, |p| self.executor.execute(&sql, p)).map(|n| n > 0),
            || self.query_lock(id),
        )
    }

    fn sweep_locks(&self, older_than: Duration) -> Result<u64, GatewayError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::store_call_span("sweep_locks", Part::TABLE).entered();

        let cutoff = format!("NOW() - INTERVAL '{} seconds'", older_than.as_secs());
        let (sql, values) = Query::update()
            .table(Self::table())
            .value(USER_ACCESS, Expr::val(Value::String(None)))
            .value(LOCKED_AT, Expr::cust("NULL"))
            .and_where(Expr::col(USER_ACCESS).is_not_null())
            .and_where(Expr::col(LOCKED_AT).lt(Expr::cust(cutoff)))
            .build(PostgresQueryBuilder);
        with_params(&values, |p| self.executor.execute(&sql, p))
    }
}
