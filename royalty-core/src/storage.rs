//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Artist accounts with materialized counters (key: wallet)
//! - `entries` - Append-only ledger entries (key: entry_id)
//! - `streams` - Playback attempt records (key: event_id)
//! - `tracks` - Track records with play counts (key: track_id)
//! - `sessions` - Consumed playback-session nonces (key: session_id)
//! - `indices` - Composite keys for ordered retrieval
//!
//! Index keys embed an inverted timestamp so a forward scan returns
//! most-recent-first, restartable by re-querying with a
//! `(timestamp, id)` cursor.

use crate::{
    error::{Error, Result},
    types::{ArtistAccount, CounterSnapshot, EntryKind, EntryStatus, LedgerEntry, StreamEvent, Track, WalletAddress},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_ENTRIES: &str = "entries";
const CF_STREAMS: &str = "streams";
const CF_TRACKS: &str = "tracks";
const CF_SESSIONS: &str = "sessions";
const CF_INDICES: &str = "indices";

/// Index key prefixes
const IDX_ENTRY_BY_ARTIST: u8 = b'e';
const IDX_STREAM_BY_ARTIST: u8 = b's';
const IDX_STREAM_BY_TRACK: u8 = b't';
const IDX_PENDING_WITHDRAWAL: u8 = b'p';
const IDX_TRACK_BY_ARTIST: u8 = b'a';

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy entry log
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_STREAMS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_TRACKS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_SESSIONS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_hot() -> Options {
        let mut opts = Options::default();
        // Frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Account operations

    /// Put artist account
    pub fn put_account(&self, account: &ArtistAccount) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = bincode::serialize(account)?;
        self.db.put_cf(cf, account.wallet.as_str().as_bytes(), &value)?;
        Ok(())
    }

    /// Get artist account by wallet
    pub fn get_account(&self, wallet: &WalletAddress) -> Result<ArtistAccount> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = self
            .db
            .get_cf(cf, wallet.as_str().as_bytes())?
            .ok_or_else(|| Error::ArtistNotFound(wallet.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Check whether an account exists without deserializing it
    pub fn account_exists(&self, wallet: &WalletAddress) -> Result<bool> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        Ok(self.db.get_pinned_cf(cf, wallet.as_str().as_bytes())?.is_some())
    }

    // Track operations

    /// Put track record (and its artist-ownership index)
    pub fn put_track(&self, track: &Track) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_tracks = self.cf_handle(CF_TRACKS)?;
        let value = bincode::serialize(track)?;
        batch.put_cf(cf_tracks, track.track_id.as_bytes(), &value);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let idx = Self::index_key_track_by_artist(&track.wallet, track.track_id);
        batch.put_cf(cf_indices, &idx, &[]);

        self.db.write(batch)?;
        Ok(())
    }

    /// Get track by ID
    pub fn get_track(&self, track_id: Uuid) -> Result<Track> {
        let cf = self.cf_handle(CF_TRACKS)?;
        let value = self
            .db
            .get_cf(cf, track_id.as_bytes())?
            .ok_or_else(|| Error::TrackNotFound(track_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// All tracks owned by an artist
    pub fn tracks_for(&self, wallet: &WalletAddress) -> Result<Vec<Track>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let prefix = Self::index_prefix_wallet(IDX_TRACK_BY_ARTIST, wallet);
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut tracks = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let track_id = Self::uuid_from_tail(&key)?;
            tracks.push(self.get_track(track_id)?);
        }

        Ok(tracks)
    }

    // Entry operations

    /// Get ledger entry by ID
    pub fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let value = self
            .db
            .get_cf(cf, entry_id.as_bytes())?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Whether a playback-session nonce was already consumed
    pub fn session_consumed(&self, session_id: Uuid) -> Result<bool> {
        let cf = self.cf_handle(CF_SESSIONS)?;
        Ok(self.db.get_pinned_cf(cf, session_id.as_bytes())?.is_some())
    }

    // Atomic batch operations
    //
    // Every balance-affecting operation applies its full effect set in a
    // single WriteBatch: either all of it lands or none of it does.

    /// Apply a qualifying settlement: counters, play count, ledger entry,
    /// stream event, session marker and all indices, atomically.
    pub fn apply_settlement(
        &self,
        account: &ArtistAccount,
        track: &Track,
        entry: &LedgerEntry,
        event: &StreamEvent,
        session_id: Option<Uuid>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        batch.put_cf(
            cf_accounts,
            account.wallet.as_str().as_bytes(),
            bincode::serialize(account)?,
        );

        let cf_tracks = self.cf_handle(CF_TRACKS)?;
        batch.put_cf(cf_tracks, track.track_id.as_bytes(), bincode::serialize(track)?);

        self.batch_entry(&mut batch, entry)?;
        self.batch_stream_event(&mut batch, event)?;
        self.batch_session(&mut batch, session_id, event.event_id)?;

        self.db.write(batch)?;

        tracing::debug!(
            entry_id = %entry.entry_id,
            artist = %entry.wallet,
            amount = %entry.amount,
            "Stream settled"
        );

        Ok(())
    }

    /// Record a non-qualifying playback attempt: stream event only
    pub fn append_stream_event(&self, event: &StreamEvent, session_id: Option<Uuid>) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.batch_stream_event(&mut batch, event)?;
        self.batch_session(&mut batch, session_id, event.event_id)?;
        self.db.write(batch)?;
        Ok(())
    }

    /// Apply a committed withdrawal: debited counters plus the pending
    /// entry and its indices, atomically.
    pub fn apply_withdrawal(&self, account: &ArtistAccount, entry: &LedgerEntry) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        batch.put_cf(
            cf_accounts,
            account.wallet.as_str().as_bytes(),
            bincode::serialize(account)?,
        );

        self.batch_entry(&mut batch, entry)?;

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(cf_indices, &Self::index_key_pending(entry.entry_id), &[]);

        self.db.write(batch)?;

        tracing::info!(
            entry_id = %entry.entry_id,
            artist = %entry.wallet,
            amount = %entry.amount,
            order_id = ?entry.external_order_id,
            "Withdrawal committed"
        );

        Ok(())
    }

    /// Apply a withdrawal resolution: rewritten entry, optional credited
    /// counters, pending marker removed, atomically.
    pub fn apply_resolution(
        &self,
        account: Option<&ArtistAccount>,
        entry: &LedgerEntry,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        batch.put_cf(cf_entries, entry.entry_id.as_bytes(), bincode::serialize(entry)?);

        if let Some(account) = account {
            let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
            batch.put_cf(
                cf_accounts,
                account.wallet.as_str().as_bytes(),
                bincode::serialize(account)?,
            );
        }

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.delete_cf(cf_indices, &Self::index_key_pending(entry.entry_id));

        self.db.write(batch)?;
        Ok(())
    }

    fn batch_entry(&self, batch: &mut WriteBatch, entry: &LedgerEntry) -> Result<()> {
        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        batch.put_cf(cf_entries, entry.entry_id.as_bytes(), bincode::serialize(entry)?);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let idx = Self::index_key_timestamped(
            IDX_ENTRY_BY_ARTIST,
            entry.wallet.as_str().as_bytes(),
            entry.timestamp_nanos,
            entry.entry_id,
        );
        batch.put_cf(cf_indices, &idx, &[]);

        Ok(())
    }

    fn batch_stream_event(&self, batch: &mut WriteBatch, event: &StreamEvent) -> Result<()> {
        let cf_streams = self.cf_handle(CF_STREAMS)?;
        batch.put_cf(cf_streams, event.event_id.as_bytes(), bincode::serialize(event)?);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let idx_artist = Self::index_key_timestamped(
            IDX_STREAM_BY_ARTIST,
            event.wallet.as_str().as_bytes(),
            event.timestamp_nanos,
            event.event_id,
        );
        batch.put_cf(cf_indices, &idx_artist, &[]);

        let idx_track = Self::index_key_timestamped(
            IDX_STREAM_BY_TRACK,
            event.track_id.as_bytes(),
            event.timestamp_nanos,
            event.event_id,
        );
        batch.put_cf(cf_indices, &idx_track, &[]);

        Ok(())
    }

    fn batch_session(
        &self,
        batch: &mut WriteBatch,
        session_id: Option<Uuid>,
        event_id: Uuid,
    ) -> Result<()> {
        if let Some(session_id) = session_id {
            let cf = self.cf_handle(CF_SESSIONS)?;
            batch.put_cf(cf, session_id.as_bytes(), event_id.as_bytes());
        }
        Ok(())
    }

    // Ordered retrieval

    /// Ledger entries for an artist, most recent first. `before` restarts
    /// the scan strictly after a previous page's oldest entry, identified
    /// by its `(timestamp_nanos, entry_id)` pair.
    pub fn entries_for(
        &self,
        wallet: &WalletAddress,
        limit: usize,
        before: Option<(i64, Uuid)>,
    ) -> Result<Vec<LedgerEntry>> {
        let ids = self.scan_timestamped(
            IDX_ENTRY_BY_ARTIST,
            wallet.as_str().as_bytes(),
            limit,
            before,
        )?;

        ids.into_iter().map(|id| self.get_entry(id)).collect()
    }

    /// Stream events for an artist, most recent first
    pub fn stream_events_for(
        &self,
        wallet: &WalletAddress,
        limit: usize,
        before: Option<(i64, Uuid)>,
    ) -> Result<Vec<StreamEvent>> {
        let ids = self.scan_timestamped(
            IDX_STREAM_BY_ARTIST,
            wallet.as_str().as_bytes(),
            limit,
            before,
        )?;

        ids.into_iter().map(|id| self.get_stream_event(id)).collect()
    }

    /// Stream events for a track, most recent first
    pub fn stream_events_for_track(
        &self,
        track_id: Uuid,
        limit: usize,
        before: Option<(i64, Uuid)>,
    ) -> Result<Vec<StreamEvent>> {
        let ids = self.scan_timestamped(
            IDX_STREAM_BY_TRACK,
            track_id.as_bytes(),
            limit,
            before,
        )?;

        ids.into_iter().map(|id| self.get_stream_event(id)).collect()
    }

    fn get_stream_event(&self, event_id: Uuid) -> Result<StreamEvent> {
        let cf = self.cf_handle(CF_STREAMS)?;
        let value = self
            .db
            .get_cf(cf, event_id.as_bytes())?
            .ok_or_else(|| Error::EntryNotFound(event_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// All withdrawal entries still awaiting external resolution
    pub fn pending_withdrawals(&self) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let prefix = vec![IDX_PENDING_WITHDRAWAL, b'|'];
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let entry_id = Self::uuid_from_tail(&key)?;
            entries.push(self.get_entry(entry_id)?);
        }

        Ok(entries)
    }

    /// Recompute counters from the entry log (the source of truth)
    pub fn recompute_counters(&self, wallet: &WalletAddress) -> Result<CounterSnapshot> {
        let cf = self.cf_handle(CF_INDICES)?;

        let prefix = Self::index_prefix_wallet(IDX_ENTRY_BY_ARTIST, wallet);
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut snapshot = CounterSnapshot {
            total_earnings: rust_decimal::Decimal::ZERO,
            available_balance: rust_decimal::Decimal::ZERO,
            withdrawn_amount: rust_decimal::Decimal::ZERO,
            total_streams: 0,
        };

        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let entry = self.get_entry(Self::uuid_from_tail(&key)?)?;
            if entry.status == EntryStatus::Failed {
                continue;
            }

            snapshot.available_balance += entry.amount;
            if entry.kind.is_earning() {
                snapshot.total_earnings += entry.amount;
            } else {
                snapshot.withdrawn_amount += -entry.amount;
            }
            if entry.kind == EntryKind::Stream {
                snapshot.total_streams += 1;
            }
        }

        Ok(snapshot)
    }

    /// Scan a timestamped index, returning up to `limit` ids most recent
    /// first, resuming strictly after the `(timestamp, id)` cursor when
    /// given.
    fn scan_timestamped(
        &self,
        tag: u8,
        key_part: &[u8],
        limit: usize,
        before: Option<(i64, Uuid)>,
    ) -> Result<Vec<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let mut prefix = vec![tag, b'|'];
        prefix.extend_from_slice(key_part);
        prefix.push(b'|');

        let start = match before {
            Some((ts, id)) => {
                // The cursor names the boundary row's exact index key.
                // Appending a byte makes the seek land strictly past it,
                // so rows sharing the boundary timestamp are not skipped.
                let mut key = Self::index_key_timestamped(tag, key_part, ts, id);
                key.push(0);
                key
            }
            None => prefix.clone(),
        };

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward));

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            ids.push(Self::uuid_from_tail(&key)?);
            if ids.len() >= limit {
                break;
            }
        }

        Ok(ids)
    }

    // Index key helpers

    fn invert_ts(ts_nanos: i64) -> [u8; 8] {
        ((i64::MAX - ts_nanos) as u64).to_be_bytes()
    }

    fn index_key_timestamped(tag: u8, key_part: &[u8], ts_nanos: i64, id: Uuid) -> Vec<u8> {
        let mut key = vec![tag, b'|'];
        key.extend_from_slice(key_part);
        key.push(b'|');
        key.extend_from_slice(&Self::invert_ts(ts_nanos));
        key.extend_from_slice(id.as_bytes());
        key
    }

    fn index_prefix_wallet(tag: u8, wallet: &WalletAddress) -> Vec<u8> {
        let mut key = vec![tag, b'|'];
        key.extend_from_slice(wallet.as_str().as_bytes());
        key.push(b'|');
        key
    }

    fn index_key_track_by_artist(wallet: &WalletAddress, track_id: Uuid) -> Vec<u8> {
        let mut key = Self::index_prefix_wallet(IDX_TRACK_BY_ARTIST, wallet);
        key.extend_from_slice(track_id.as_bytes());
        key
    }

    fn index_key_pending(entry_id: Uuid) -> Vec<u8> {
        let mut key = vec![IDX_PENDING_WITHDRAWAL, b'|'];
        key.extend_from_slice(entry_id.as_bytes());
        key
    }

    fn uuid_from_tail(key: &[u8]) -> Result<Uuid> {
        if key.len() < 16 {
            return Err(Error::Storage("Index key too short".to_string()));
        }
        let bytes: [u8; 16] = key[key.len() - 16..]
            .try_into()
            .map_err(|_| Error::Storage("Malformed index key".to_string()))?;
        Ok(Uuid::from_bytes(bytes))
    }

    // Statistics

    /// Approximate record counts (fast, for platform-wide reporting)
    pub fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_artists: self.approximate_count(CF_ACCOUNTS)?,
            total_tracks: self.approximate_count(CF_TRACKS)?,
            total_entries: self.approximate_count(CF_ENTRIES)?,
            total_stream_events: self.approximate_count(CF_STREAMS)?,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Registered artist accounts
    pub total_artists: u64,
    /// Registered tracks
    pub total_tracks: u64,
    /// Ledger entries
    pub total_entries: u64,
    /// Playback attempts recorded
    pub total_stream_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::default_price_per_stream;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_wallet() -> WalletAddress {
        WalletAddress::new("0xa1b2c3d4")
    }

    fn test_entry(wallet: &WalletAddress, amount: rust_decimal::Decimal) -> LedgerEntry {
        LedgerEntry {
            entry_id: Uuid::now_v7(),
            wallet: wallet.clone(),
            amount,
            kind: if amount.is_sign_negative() {
                EntryKind::Withdrawal
            } else {
                EntryKind::Stream
            },
            status: if amount.is_sign_negative() {
                EntryStatus::Pending
            } else {
                EntryStatus::Completed
            },
            track_id: None,
            withdrawal_address: None,
            withdrawal_token: None,
            external_order_id: None,
            note: None,
            timestamp_nanos: Utc::now().timestamp_nanos_opt().unwrap(),
        }
    }

    fn test_event(wallet: &WalletAddress, track_id: Uuid) -> StreamEvent {
        StreamEvent {
            event_id: Uuid::new_v4(),
            track_id,
            wallet: wallet.clone(),
            listener_wallet: WalletAddress::new("0xlistener"),
            duration_secs: 45,
            completed: true,
            earned_amount: dec!(0.001),
            timestamp_nanos: Utc::now().timestamp_nanos_opt().unwrap(),
        }
    }

    #[test]
    fn test_account_roundtrip() {
        let (storage, _temp) = test_storage();
        let wallet = test_wallet();

        assert!(!storage.account_exists(&wallet).unwrap());

        let account = ArtistAccount::new(wallet.clone(), "artist", default_price_per_stream());
        storage.put_account(&account).unwrap();

        assert!(storage.account_exists(&wallet).unwrap());
        let retrieved = storage.get_account(&wallet).unwrap();
        assert_eq!(retrieved.wallet, wallet);
        assert_eq!(retrieved.price_per_stream, dec!(0.001));
    }

    #[test]
    fn test_unknown_account() {
        let (storage, _temp) = test_storage();
        let result = storage.get_account(&test_wallet());
        assert!(matches!(result, Err(Error::ArtistNotFound(_))));
    }

    #[test]
    fn test_track_roundtrip_and_artist_index() {
        let (storage, _temp) = test_storage();
        let wallet = test_wallet();

        let track_a = Track::new(wallet.clone(), "first");
        let track_b = Track::new(wallet.clone(), "second");
        storage.put_track(&track_a).unwrap();
        storage.put_track(&track_b).unwrap();

        let retrieved = storage.get_track(track_a.track_id).unwrap();
        assert_eq!(retrieved.title, "first");

        let tracks = storage.tracks_for(&wallet).unwrap();
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn test_apply_settlement_atomic() {
        let (storage, _temp) = test_storage();
        let wallet = test_wallet();

        let mut account = ArtistAccount::new(wallet.clone(), "artist", default_price_per_stream());
        let mut track = Track::new(wallet.clone(), "song");
        storage.put_account(&account).unwrap();
        storage.put_track(&track).unwrap();

        account.total_streams += 1;
        account.total_earnings += dec!(0.001);
        account.available_balance += dec!(0.001);
        track.play_count += 1;

        let mut entry = test_entry(&wallet, dec!(0.001));
        entry.track_id = Some(track.track_id);
        let event = test_event(&wallet, track.track_id);
        let session = Uuid::new_v4();

        storage
            .apply_settlement(&account, &track, &entry, &event, Some(session))
            .unwrap();

        assert_eq!(storage.get_account(&wallet).unwrap().available_balance, dec!(0.001));
        assert_eq!(storage.get_track(track.track_id).unwrap().play_count, 1);
        assert_eq!(storage.get_entry(entry.entry_id).unwrap().amount, dec!(0.001));
        assert!(storage.session_consumed(session).unwrap());
        assert_eq!(storage.stream_events_for(&wallet, 10, None).unwrap().len(), 1);
    }

    #[test]
    fn test_entries_most_recent_first_with_cursor() {
        let (storage, _temp) = test_storage();
        let wallet = test_wallet();
        let account = ArtistAccount::new(wallet.clone(), "artist", default_price_per_stream());
        let track = Track::new(wallet.clone(), "song");
        storage.put_account(&account).unwrap();
        storage.put_track(&track).unwrap();

        let base = Utc::now().timestamp_nanos_opt().unwrap();
        for i in 0..5i64 {
            let mut entry = test_entry(&wallet, dec!(0.001));
            entry.timestamp_nanos = base + i * 1_000_000;
            let event = test_event(&wallet, track.track_id);
            storage
                .apply_settlement(&account, &track, &entry, &event, None)
                .unwrap();
        }

        let page1 = storage.entries_for(&wallet, 3, None).unwrap();
        assert_eq!(page1.len(), 3);
        assert!(page1[0].timestamp_nanos > page1[1].timestamp_nanos);
        assert!(page1[1].timestamp_nanos > page1[2].timestamp_nanos);

        let boundary = page1.last().unwrap();
        let cursor = (boundary.timestamp_nanos, boundary.entry_id);
        let page2 = storage.entries_for(&wallet, 10, Some(cursor)).unwrap();
        assert_eq!(page2.len(), 2);
        assert!(page2[0].timestamp_nanos < boundary.timestamp_nanos);
    }

    #[test]
    fn test_cursor_keeps_entries_sharing_a_timestamp() {
        let (storage, _temp) = test_storage();
        let wallet = test_wallet();
        let account = ArtistAccount::new(wallet.clone(), "artist", default_price_per_stream());
        let track = Track::new(wallet.clone(), "song");
        storage.put_account(&account).unwrap();
        storage.put_track(&track).unwrap();

        // Three entries, the newer two landing on the same nanosecond
        let base = Utc::now().timestamp_nanos_opt().unwrap();
        for ts in [base, base + 1, base + 1] {
            let mut entry = test_entry(&wallet, dec!(0.001));
            entry.timestamp_nanos = ts;
            let event = test_event(&wallet, track.track_id);
            storage
                .apply_settlement(&account, &track, &entry, &event, None)
                .unwrap();
        }

        let page1 = storage.entries_for(&wallet, 1, None).unwrap();
        assert_eq!(page1.len(), 1);
        assert_eq!(page1[0].timestamp_nanos, base + 1);

        // The tied entry must show up on the next page, not vanish
        let boundary = &page1[0];
        let page2 = storage
            .entries_for(&wallet, 10, Some((boundary.timestamp_nanos, boundary.entry_id)))
            .unwrap();
        assert_eq!(page2.len(), 2);
        assert_eq!(page2[0].timestamp_nanos, base + 1);
        assert_ne!(page2[0].entry_id, boundary.entry_id);
        assert_eq!(page2[1].timestamp_nanos, base);
    }

    #[test]
    fn test_storage_is_shareable_across_threads() {
        let (storage, _temp) = test_storage();
        let storage = Arc::new(storage);
        let wallet = test_wallet();

        let account = ArtistAccount::new(wallet.clone(), "artist", default_price_per_stream());
        storage.put_account(&account).unwrap();

        let mut workers = Vec::new();
        for _ in 0..4 {
            let storage = Arc::clone(&storage);
            let wallet = wallet.clone();
            workers.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    storage.get_account(&wallet).unwrap();
                    storage.stats().unwrap();
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
    }

    #[test]
    fn test_pending_withdrawals_lifecycle() {
        let (storage, _temp) = test_storage();
        let wallet = test_wallet();
        let mut account = ArtistAccount::new(wallet.clone(), "artist", default_price_per_stream());
        account.available_balance = dec!(10);
        storage.put_account(&account).unwrap();

        account.available_balance -= dec!(5);
        account.withdrawn_amount += dec!(5);
        let mut entry = test_entry(&wallet, dec!(-5));
        entry.external_order_id = Some("ord-1".to_string());

        storage.apply_withdrawal(&account, &entry).unwrap();
        assert_eq!(storage.pending_withdrawals().unwrap().len(), 1);

        entry.status = EntryStatus::Completed;
        storage.apply_resolution(None, &entry).unwrap();
        assert!(storage.pending_withdrawals().unwrap().is_empty());
        assert_eq!(
            storage.get_entry(entry.entry_id).unwrap().status,
            EntryStatus::Completed
        );
    }

    #[test]
    fn test_recompute_counters_excludes_failed() {
        let (storage, _temp) = test_storage();
        let wallet = test_wallet();
        let account = ArtistAccount::new(wallet.clone(), "artist", default_price_per_stream());
        let track = Track::new(wallet.clone(), "song");
        storage.put_account(&account).unwrap();
        storage.put_track(&track).unwrap();

        for _ in 0..3 {
            let entry = test_entry(&wallet, dec!(0.001));
            let event = test_event(&wallet, track.track_id);
            storage
                .apply_settlement(&account, &track, &entry, &event, None)
                .unwrap();
        }

        let mut withdrawal = test_entry(&wallet, dec!(-0.002));
        storage.apply_withdrawal(&account, &withdrawal).unwrap();

        let snapshot = storage.recompute_counters(&wallet).unwrap();
        assert_eq!(snapshot.total_earnings, dec!(0.003));
        assert_eq!(snapshot.withdrawn_amount, dec!(0.002));
        assert_eq!(snapshot.available_balance, dec!(0.001));
        assert_eq!(snapshot.total_streams, 3);

        // Failed withdrawal drops out of every sum
        withdrawal.status = EntryStatus::Failed;
        storage.apply_resolution(None, &withdrawal).unwrap();

        let snapshot = storage.recompute_counters(&wallet).unwrap();
        assert_eq!(snapshot.withdrawn_amount, rust_decimal::Decimal::ZERO);
        assert_eq!(snapshot.available_balance, dec!(0.003));
    }
}
