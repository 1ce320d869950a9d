use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use indexer::error::{ErrorKind, IndexerResult};
use indexer::source::{EventSource, StartPosition};
use indexer::types::{ChangeEvent, EventKind, Position};
use indexer::{bail, indexer_error};
use serde::de::DeserializeOwned;
use sqlx::postgres::PgListener;
use sqlx::{FromRow, PgPool};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::CHANGELOG_CHANNEL;

/// A changelog row as stored by the capture trigger.
#[derive(Debug, FromRow)]
struct ChangelogRecord {
    seq: i64,
    kind: String,
    pre: Option<serde_json::Value>,
    post: Option<serde_json::Value>,
}

impl ChangelogRecord {
    /// Converts the record into a typed event, decoding the row images.
    fn into_event<R: DeserializeOwned>(self) -> IndexerResult<ChangeEvent<R>> {
        let kind = match self.kind.as_str() {
            "insert" => EventKind::Insert,
            "update" => EventKind::Update,
            "delete" => EventKind::Delete,
            other => bail!(
                ErrorKind::InvalidData,
                "Unknown changelog event kind",
                format!("seq {}: {other}", self.seq)
            ),
        };

        let pre = self.pre.map(serde_json::from_value).transpose()?;
        let post = self.post.map(serde_json::from_value).transpose()?;

        Ok(ChangeEvent {
            kind,
            pre,
            post,
            position: to_position(self.seq)?,
        })
    }
}

fn to_position(seq: i64) -> IndexerResult<Position> {
    Position::try_from(seq).map_err(|err| {
        indexer_error!(
            ErrorKind::InvalidData,
            "Changelog sequence is negative",
            seq,
            source: err
        )
    })
}

fn to_seq(position: Position) -> IndexerResult<i64> {
    i64::try_from(position).map_err(|err| {
        indexer_error!(
            ErrorKind::InvalidData,
            "Position does not fit a changelog sequence",
            position,
            source: err
        )
    })
}

/// Change stream of one table, read from `cdc.changelog`.
///
/// The source keeps one pooled connection listening on [`CHANGELOG_CHANNEL`] so that a poll
/// wakes up as soon as the table changes instead of re-querying in a loop.
pub struct PgEventSource<R> {
    pool: PgPool,
    table_name: String,
    listener: Option<PgListener>,
    cursor: i64,
    _row: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for PgEventSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgEventSource")
            .field("table_name", &self.table_name)
            .field("subscribed", &self.listener.is_some())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl<R> PgEventSource<R> {
    pub fn new(pool: PgPool, table_name: impl Into<String>) -> Self {
        Self {
            pool,
            table_name: table_name.into(),
            listener: None,
            cursor: 0,
            _row: PhantomData,
        }
    }

    async fn fetch(&self, limit: usize) -> IndexerResult<Vec<ChangelogRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = sqlx::query_as::<_, ChangelogRecord>(
            r#"
            select seq, kind, pre, post
            from cdc.changelog
            where table_name = $1 and seq > $2
            order by seq
            limit $3
            "#,
        )
        .bind(&self.table_name)
        .bind(self.cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Waits until the capture trigger notifies a change of this table or `deadline` passes.
    async fn wait_for_change(&mut self, deadline: Instant) -> IndexerResult<()> {
        let Some(listener) = self.listener.as_mut() else {
            bail!(
                ErrorKind::InvalidState,
                "Event source polled before subscribing",
                self.table_name.clone()
            );
        };

        loop {
            match tokio::time::timeout_at(deadline, listener.recv()).await {
                Ok(notification) => {
                    if notification?.payload() == self.table_name {
                        return Ok(());
                    }
                }
                Err(_) => return Ok(()),
            }
        }
    }
}

impl<R> EventSource for PgEventSource<R>
where
    R: DeserializeOwned + Send + 'static,
{
    type Row = R;

    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn subscribe(&mut self, start: StartPosition) -> IndexerResult<()> {
        let subscribe = async {
            let mut listener = PgListener::connect_with(&self.pool).await?;
            listener.listen(CHANGELOG_CHANNEL).await?;

            let cursor: i64 = match start {
                StartPosition::LastRecorded => sqlx::query_scalar::<_, i64>(
                    "select coalesce(max(last_seq), 0) from cdc.positions where table_name = $1",
                ),
                StartPosition::Latest => sqlx::query_scalar::<_, i64>(
                    "select coalesce(max(seq), 0) from cdc.changelog where table_name = $1",
                ),
            }
            .bind(&self.table_name)
            .fetch_one(&self.pool)
            .await?;

            Ok::<_, sqlx::Error>((listener, cursor))
        };

        match subscribe.await {
            Ok((listener, cursor)) => {
                info!(table = %self.table_name, ?start, cursor, "subscribed to changelog");
                self.listener = Some(listener);
                self.cursor = cursor;

                Ok(())
            }
            Err(err) => Err(indexer_error!(
                ErrorKind::SubscriptionFailed,
                "Could not subscribe to the changelog",
                format!("{}: {err}", self.table_name),
                source: err
            )),
        }
    }

    async fn poll(
        &mut self,
        max_wait: Duration,
        limit: usize,
    ) -> IndexerResult<Vec<ChangeEvent<R>>> {
        let deadline = Instant::now() + max_wait;

        let mut records = self.fetch(limit).await?;
        if records.is_empty() && !max_wait.is_zero() {
            self.wait_for_change(deadline).await?;
            records = self.fetch(limit).await?;
        }

        let mut events = Vec::with_capacity(records.len());
        for record in records {
            let seq = record.seq;
            match record.into_event() {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(
                        table = %self.table_name,
                        seq,
                        error = %err,
                        "skipping undecodable changelog row"
                    );
                }
            }
            self.cursor = self.cursor.max(seq);
        }

        debug!(
            table = %self.table_name,
            events = events.len(),
            cursor = self.cursor,
            "polled changelog"
        );

        Ok(events)
    }

    async fn record_position(&mut self, position: Position) -> IndexerResult<()> {
        sqlx::query(
            r#"
            insert into cdc.positions (table_name, last_seq)
            values ($1, $2)
            on conflict (table_name)
            do update set last_seq = excluded.last_seq, updated_at = now()
            "#,
        )
        .bind(&self.table_name)
        .bind(to_seq(position)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer::types::{AttributeRow, SchemalessRow};
    use serde_json::json;

    fn record(
        kind: &str,
        pre: Option<serde_json::Value>,
        post: Option<serde_json::Value>,
    ) -> ChangelogRecord {
        ChangelogRecord {
            seq: 17,
            kind: kind.to_string(),
            pre,
            post,
        }
    }

    #[test]
    fn captured_row_images_are_decoded() {
        let pre = json!({"tupleid": 7, "fieldid": 1, "data": "41", "ignored": true});
        let post = json!({"tupleid": 7, "fieldid": 1, "data": "42", "ignored": true});

        let event: ChangeEvent<AttributeRow> =
            record("update", Some(pre), Some(post)).into_event().unwrap();

        assert_eq!(event.kind, EventKind::Update);
        assert_eq!(event.position, 17);
        assert_eq!(event.pre.unwrap().value, "41");
        assert_eq!(
            event.post,
            Some(AttributeRow {
                tuple_id: 7,
                field_id: 1,
                value: "42".to_string(),
            })
        );
    }

    #[test]
    fn deletes_carry_only_the_pre_image() {
        let pre = json!({"inode_id": 42, "inode_pid": 1, "name": "owner", "data": "alice"});

        let event: ChangeEvent<SchemalessRow> =
            record("delete", Some(pre), None).into_event().unwrap();

        assert_eq!(event.kind, EventKind::Delete);
        assert!(event.post.is_none());
        assert_eq!(event.pre.unwrap().entity_id, 42);
    }

    #[test]
    fn unknown_kind_is_invalid_data() {
        let err = record("truncate", None, None)
            .into_event::<AttributeRow>()
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn malformed_image_fails_to_decode() {
        let post = json!({"tupleid": "seven", "fieldid": 1, "data": "42"});

        let err = record("insert", None, Some(post))
            .into_event::<AttributeRow>()
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DeserializationError);
    }

    #[test]
    fn positions_map_to_sequences() {
        assert_eq!(to_seq(5).unwrap(), 5);
        assert_eq!(to_position(5).unwrap(), 5);
        assert_eq!(to_seq(u64::MAX).unwrap_err().kind(), ErrorKind::InvalidData);
        assert_eq!(to_position(-1).unwrap_err().kind(), ErrorKind::InvalidData);
    }
}
