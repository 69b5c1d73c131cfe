//! The `customers` table.

use crate::dao::BaseDao;
use crate::db::DbConnection;
use crate::error::DaoResult;
use crate::impl_record;
use crate::sql_args;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

/// One row of `customers(id, name, email, birth)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub birth: Option<NaiveDate>,
}

impl_record!(Customer { id, name, email, birth });

impl Customer {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        email: Option<&str>,
        birth: Option<NaiveDate>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.map(String::from),
            birth,
        }
    }
}

/// Operations on the `customers` table. Every method runs on the caller's
/// connection, so several calls can share one transaction.
#[async_trait]
pub trait CustomerDao: Send + Sync {
    /// Insert a customer; the id is assigned by the database.
    async fn insert(&self, conn: &mut DbConnection, customer: &Customer) -> DaoResult<u64>;

    async fn delete_by_id(&self, conn: &mut DbConnection, id: i64) -> DaoResult<u64>;

    /// Overwrite name, email and birth of the customer with `customer.id`.
    async fn update(&self, conn: &mut DbConnection, customer: &Customer) -> DaoResult<u64>;

    async fn get_customer_by_id(
        &self,
        conn: &mut DbConnection,
        id: i64,
    ) -> DaoResult<Option<Customer>>;

    async fn get_all(&self, conn: &mut DbConnection) -> DaoResult<Vec<Customer>>;

    async fn get_count(&self, conn: &mut DbConnection) -> DaoResult<i64>;

    /// Latest birth date on record, or `None` when no customer has one.
    async fn get_max_birth(&self, conn: &mut DbConnection) -> DaoResult<Option<NaiveDate>>;
}

#[derive(Debug, Clone, Default)]
pub struct CustomerDaoImpl {
    base: BaseDao<Customer>,
}

impl CustomerDaoImpl {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerDao for CustomerDaoImpl {
    async fn insert(&self, conn: &mut DbConnection, customer: &Customer) -> DaoResult<u64> {
        let sql = "insert into customers(name, email, birth) values(?, ?, ?)";
        let args = sql_args![customer.name.as_str(), customer.email.as_deref(), customer.birth];
        self.base.update(conn, sql, &args).await
    }

    async fn delete_by_id(&self, conn: &mut DbConnection, id: i64) -> DaoResult<u64> {
        let sql = "delete from customers where id = ?";
        self.base.update(conn, sql, &sql_args![id]).await
    }

    async fn update(&self, conn: &mut DbConnection, customer: &Customer) -> DaoResult<u64> {
        let sql = "update customers set name = ?, email = ?, birth = ? where id = ?";
        let args = sql_args![
            customer.name.as_str(),
            customer.email.as_deref(),
            customer.birth,
            customer.id
        ];
        self.base.update(conn, sql, &args).await
    }

    async fn get_customer_by_id(
        &self,
        conn: &mut DbConnection,
        id: i64,
    ) -> DaoResult<Option<Customer>> {
        let sql = "select id, name, email, birth from customers where id = ?";
        self.base.query_one(conn, sql, &sql_args![id]).await
    }

    async fn get_all(&self, conn: &mut DbConnection) -> DaoResult<Vec<Customer>> {
        let sql = "select id, name, email, birth from customers order by id";
        self.base.query(conn, sql, &[]).await
    }

    async fn get_count(&self, conn: &mut DbConnection) -> DaoResult<i64> {
        let count = self
            .base
            .value::<i64>(conn, "select count(*) from customers", &[])
            .await?;
        Ok(count.unwrap_or(0))
    }

    async fn get_max_birth(&self, conn: &mut DbConnection) -> DaoResult<Option<NaiveDate>> {
        // Read the column itself rather than max(birth): an aggregate loses
        // the declared DATE type on SQLite.
        let sql = "select birth from customers where birth is not null order by birth desc limit 1";
        self.base.value::<NaiveDate>(conn, sql, &[]).await
    }
}
