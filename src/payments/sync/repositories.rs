use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::payments::{PaymentStatus, PendingPayment, StoreError, TransferRecord};

/// Rows per multi-row insert; nine binds each stays well under the bind parameter limit.
const UPSERT_CHUNK: usize = 1000;

/// Repository for transfers and the sync cursor
#[async_trait::async_trait]
pub trait TransferStore: Send + Sync {
	/// Highest stored logical time of transfers received by `receiver`.
	async fn latest_transfer_lt(&self, receiver: &str) -> Result<Option<u64>, StoreError>;

	/// Opens a transaction; dropping it without commit rolls back.
	async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// Transaction-bound persistence operations used by the reconciliation
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
	/// Loads and locks the payment.
	async fn payment_by_id(&mut self, id: Uuid) -> Result<Option<PendingPayment>, StoreError>;

	async fn update_payment_status(
		&mut self,
		id: Uuid,
		status: PaymentStatus,
	) -> Result<(), StoreError>;

	/// Inserts transfers keyed by `(tx_hash, tx_lt)`. An existing row keeps `is_applied` once set.
	async fn upsert_transfers(&mut self, records: &[TransferRecord]) -> Result<(), StoreError>;

	async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Repository for the set of merchant addresses to scan
#[async_trait::async_trait]
pub trait AddressSource: Send + Sync {
	async fn receiving_addresses(&self) -> Result<Vec<String>, StoreError>;
}

/// Addresses fixed by configuration.
pub struct StaticAddresses {
	addresses: Vec<String>,
}

impl StaticAddresses {
	pub fn new(addresses: Vec<String>) -> Self {
		Self { addresses }
	}
}

#[async_trait::async_trait]
impl AddressSource for StaticAddresses {
	async fn receiving_addresses(&self) -> Result<Vec<String>, StoreError> {
		Ok(self.addresses.clone())
	}
}

/// Collapses records sharing a key, keeping `is_applied` if any copy has it.
pub(crate) fn dedup_records(records: &[TransferRecord]) -> Vec<TransferRecord> {
	let mut index: HashMap<(&str, u64), usize> = HashMap::new();
	let mut out: Vec<TransferRecord> = Vec::with_capacity(records.len());
	for record in records {
		match index.get(&record.transfer.key()) {
			Some(&i) => out[i].is_applied |= record.is_applied,
			None => {
				index.insert(record.transfer.key(), out.len());
				out.push(record.clone());
			}
		}
	}
	out
}

fn lt_to_db(lt: u64) -> Result<i64, StoreError> {
	i64::try_from(lt).map_err(|_| StoreError::OutOfRange(format!("logical time {}", lt)))
}

/// PostgreSQL implementation of the repositories
#[derive(Clone)]
pub struct PgStore {
	pool: PgPool,
}

impl PgStore {
	pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
		let pool = PgPoolOptions::new()
			.max_connections(max_connections)
			.connect(database_url)
			.await?;
		Ok(Self { pool })
	}

	/// Applies the embedded migrations.
	pub async fn migrate(&self) -> Result<(), StoreError> {
		sqlx::migrate!("./migrations").run(&self.pool).await?;
		info!("Database migrations applied");
		Ok(())
	}
}

#[async_trait::async_trait]
impl TransferStore for PgStore {
	async fn latest_transfer_lt(&self, receiver: &str) -> Result<Option<u64>, StoreError> {
		let lt: Option<i64> =
			sqlx::query_scalar("SELECT MAX(tx_lt) FROM jetton_transfers WHERE receiver_address = $1")
				.bind(receiver)
				.fetch_one(&self.pool)
				.await?;
		Ok(lt.map(|lt| lt as u64))
	}

	async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
		let tx = self.pool.begin().await?;
		Ok(Box::new(PgStoreTransaction { tx }))
	}
}

#[async_trait::async_trait]
impl AddressSource for PgStore {
	async fn receiving_addresses(&self) -> Result<Vec<String>, StoreError> {
		let addresses: Vec<String> = sqlx::query_scalar(
			"SELECT DISTINCT payment_metadata ->> 'ton_address' AS address FROM mini_apps \
			 WHERE payment_metadata ->> 'ton_address' IS NOT NULL \
			 AND payment_metadata ->> 'ton_address' <> ''",
		)
		.fetch_all(&self.pool)
		.await?;
		debug!("Discovered {} receiving addresses", addresses.len());
		Ok(addresses)
	}
}

struct PgStoreTransaction {
	tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl StoreTransaction for PgStoreTransaction {
	async fn payment_by_id(&mut self, id: Uuid) -> Result<Option<PendingPayment>, StoreError> {
		let payment = sqlx::query_as::<_, PendingPayment>(
			"SELECT id, status, jetton_amount, jetton_name FROM payments WHERE id = $1 FOR UPDATE",
		)
		.bind(id)
		.fetch_optional(&mut *self.tx)
		.await?;
		Ok(payment)
	}

	async fn update_payment_status(
		&mut self,
		id: Uuid,
		status: PaymentStatus,
	) -> Result<(), StoreError> {
		sqlx::query("UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1")
			.bind(id)
			.bind(status)
			.execute(&mut *self.tx)
			.await?;
		Ok(())
	}

	async fn upsert_transfers(&mut self, records: &[TransferRecord]) -> Result<(), StoreError> {
		let records = dedup_records(records);
		for chunk in records.chunks(UPSERT_CHUNK) {
			let rows = chunk
				.iter()
				.map(|r| Ok((r, lt_to_db(r.transfer.tx_lt)?)))
				.collect::<Result<Vec<_>, StoreError>>()?;

			let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
				"INSERT INTO jetton_transfers (tx_hash, tx_lt, sender_address, receiver_address, \
				 jetton_name, jetton_amount, text_comment, is_applied, created_at) ",
			);
			builder.push_values(rows, |mut row, (record, lt)| {
				let transfer = &record.transfer;
				row.push_bind(transfer.tx_hash.clone())
					.push_bind(lt)
					.push_bind(transfer.sender.clone())
					.push_bind(transfer.receiver.clone())
					.push_bind(transfer.jetton_name.clone())
					.push_bind(transfer.amount)
					.push_bind(transfer.comment.clone())
					.push_bind(record.is_applied)
					.push_bind(transfer.created_at);
			});
			builder.push(
				" ON CONFLICT (tx_hash, tx_lt) DO UPDATE \
				 SET is_applied = jetton_transfers.is_applied OR EXCLUDED.is_applied",
			);
			builder.build().execute(&mut *self.tx).await?;
		}
		Ok(())
	}

	async fn commit(self: Box<Self>) -> Result<(), StoreError> {
		self.tx.commit().await?;
		Ok(())
	}
}
