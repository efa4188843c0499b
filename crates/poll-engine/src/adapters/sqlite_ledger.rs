//! SQLite ledger gateway.
//!
//! Reads the node's SQLite database directly. Queries run on the blocking
//! thread pool; the connection is shared behind a mutex.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use shared_types::entities::{Address, UnitId};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::entities::{AttestedVoteRow, PollSummary, VoteRow, VoteSequence};
use crate::domain::errors::PollBotError;
use crate::ports::outbound::LedgerGateway;

/// Upper bound on bound parameters per `IN (...)` list.
const MAX_IN_PARAMS: usize = 500;

/// Subset of the node schema the gateway reads.
pub const LEDGER_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS polls (
    unit TEXT NOT NULL PRIMARY KEY,
    message_index INTEGER NOT NULL DEFAULT 0,
    question TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS poll_choices (
    unit TEXT NOT NULL,
    choice_index INTEGER NOT NULL,
    choice TEXT NOT NULL,
    PRIMARY KEY (unit, choice_index)
);
CREATE TABLE IF NOT EXISTS votes (
    unit TEXT NOT NULL,
    message_index INTEGER NOT NULL DEFAULT 0,
    poll_unit TEXT NOT NULL,
    choice TEXT NOT NULL,
    PRIMARY KEY (unit, message_index)
);
CREATE INDEX IF NOT EXISTS votes_by_poll ON votes(poll_unit);
CREATE TABLE IF NOT EXISTS unit_authors (
    unit TEXT NOT NULL,
    address TEXT NOT NULL,
    PRIMARY KEY (unit, address)
);
CREATE TABLE IF NOT EXISTS outputs (
    unit TEXT NOT NULL,
    message_index INTEGER NOT NULL DEFAULT 0,
    output_index INTEGER NOT NULL DEFAULT 0,
    address TEXT NOT NULL,
    amount INTEGER NOT NULL,
    asset TEXT NULL,
    is_spent INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (unit, message_index, output_index)
);
CREATE TABLE IF NOT EXISTS attested_fields (
    unit TEXT NOT NULL,
    message_index INTEGER NOT NULL DEFAULT 0,
    attestor_address TEXT NOT NULL,
    address TEXT NOT NULL,
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (unit, message_index, field)
);
";

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

fn to_sequence(rowid: i64) -> VoteSequence {
    u64::try_from(rowid).unwrap_or_default()
}

/// Ledger gateway over the node's SQLite database.
#[derive(Clone)]
pub struct SqliteLedgerGateway {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedgerGateway {
    /// Open the database at `path` without write access.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, PollBotError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        // the node writes concurrently
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!(path = %path.as_ref().display(), "Opened ledger database");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already open connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_connection<T, F>(&self, op: F) -> Result<T, PollBotError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            op(&conn)
        })
        .await
        .map_err(|e| PollBotError::Ledger(format!("ledger task failed: {e}")))?
        .map_err(PollBotError::from)
    }
}

#[async_trait]
impl LedgerGateway for SqliteLedgerGateway {
    async fn whitelisted_polls(&self, units: &[UnitId]) -> Result<Vec<PollSummary>, PollBotError> {
        if units.is_empty() {
            return Ok(Vec::new());
        }
        let units: Vec<String> = units.iter().map(|u| u.as_str().to_string()).collect();

        self.with_connection(move |conn| {
            let mut found: Vec<(i64, PollSummary)> = Vec::new();
            for chunk in units.chunks(MAX_IN_PARAMS) {
                let sql = format!(
                    "SELECT rowid, unit, question FROM polls WHERE unit IN ({})",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        PollSummary {
                            unit: UnitId::new(row.get::<_, String>(1)?),
                            question: row.get(2)?,
                        },
                    ))
                })?;
                for row in rows {
                    found.push(row?);
                }
            }
            found.sort_by(|a, b| b.0.cmp(&a.0));
            Ok(found.into_iter().map(|(_, poll)| poll).collect())
        })
        .await
    }

    async fn question(&self, unit: &UnitId) -> Result<Option<String>, PollBotError> {
        let unit = unit.as_str().to_string();
        self.with_connection(move |conn| {
            conn.query_row(
                "SELECT question FROM polls WHERE unit = ?1",
                params![unit],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn choices(&self, unit: &UnitId) -> Result<Vec<String>, PollBotError> {
        let unit = unit.as_str().to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn
                .prepare("SELECT choice FROM poll_choices WHERE unit = ?1 ORDER BY choice_index")?;
            let rows = stmt.query_map(params![unit], |row| row.get(0))?;
            rows.collect()
        })
        .await
    }

    async fn vote_rows(&self, poll_unit: &UnitId) -> Result<Vec<VoteRow>, PollBotError> {
        let poll_unit = poll_unit.as_str().to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT unit_authors.address, votes.choice, votes.rowid \
                 FROM votes JOIN unit_authors USING(unit) \
                 WHERE votes.poll_unit = ?1 \
                 ORDER BY votes.rowid",
            )?;
            let rows = stmt.query_map(params![poll_unit], |row| {
                Ok(VoteRow {
                    address: Address::new(row.get::<_, String>(0)?),
                    choice: row.get(1)?,
                    sequence: to_sequence(row.get(2)?),
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn native_balances(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, u64>, PollBotError> {
        if addresses.is_empty() {
            return Ok(HashMap::new());
        }
        let addresses: Vec<String> = addresses.iter().map(|a| a.as_str().to_string()).collect();

        self.with_connection(move |conn| {
            let mut balances = HashMap::new();
            for chunk in addresses.chunks(MAX_IN_PARAMS) {
                let sql = format!(
                    "SELECT address, SUM(amount) FROM outputs \
                     WHERE asset IS NULL AND is_spent = 0 AND address IN ({}) \
                     GROUP BY address",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (address, amount) = row?;
                    balances.insert(Address::new(address), u64::try_from(amount).unwrap_or(0));
                }
            }
            Ok(balances)
        })
        .await
    }

    async fn attested_vote_rows(
        &self,
        poll_unit: &UnitId,
        attestors: &[Address],
    ) -> Result<Vec<AttestedVoteRow>, PollBotError> {
        if attestors.is_empty() {
            return Ok(Vec::new());
        }
        let poll_unit = poll_unit.as_str().to_string();
        let attestors: Vec<String> = attestors.iter().map(|a| a.as_str().to_string()).collect();

        self.with_connection(move |conn| {
            let mut rows = Vec::new();
            // One bound parameter goes to the poll unit.
            for chunk in attestors.chunks(MAX_IN_PARAMS - 1) {
                let sql = format!(
                    "SELECT DISTINCT unit_authors.address, attested_fields.value, votes.choice, votes.rowid \
                     FROM votes \
                     JOIN unit_authors USING(unit) \
                     JOIN attested_fields ON attested_fields.address = unit_authors.address \
                     WHERE votes.poll_unit = ? \
                       AND attested_fields.field = 'user_id' \
                       AND attested_fields.attestor_address IN ({}) \
                     ORDER BY votes.rowid",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let bound = std::iter::once(&poll_unit).chain(chunk.iter());
                let chunk_rows = stmt.query_map(params_from_iter(bound), |row| {
                    Ok(AttestedVoteRow {
                        address: Address::new(row.get::<_, String>(0)?),
                        user_id: row.get(1)?,
                        choice: row.get(2)?,
                        sequence: to_sequence(row.get(3)?),
                    })
                })?;
                for row in chunk_rows {
                    rows.push(row?);
                }
            }
            rows.sort_by(|a, b| {
                (a.sequence, &a.address, &a.user_id).cmp(&(b.sequence, &b.address, &b.user_id))
            });
            rows.dedup();
            Ok(rows)
        })
        .await
    }

    async fn latest_vote_sequence(
        &self,
        poll_unit: &UnitId,
    ) -> Result<Option<VoteSequence>, PollBotError> {
        let poll_unit = poll_unit.as_str().to_string();
        self.with_connection(move |conn| {
            let latest: Option<i64> = conn.query_row(
                "SELECT MAX(rowid) FROM votes WHERE poll_unit = ?1",
                params![poll_unit],
                |row| row.get(0),
            )?;
            Ok(latest.map(to_sequence))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SqliteLedgerGateway {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LEDGER_SCHEMA).unwrap();
        conn.execute_batch(
            "
            INSERT INTO polls(unit, question) VALUES ('P1', 'Raise the fee?');
            INSERT INTO polls(unit, question) VALUES ('P2', 'Lower the cap?');
            INSERT INTO poll_choices VALUES ('P1', 1, 'No');
            INSERT INTO poll_choices VALUES ('P1', 0, 'Yes');

            INSERT INTO votes(unit, poll_unit, choice) VALUES ('V1', 'P1', 'Yes');
            INSERT INTO unit_authors VALUES ('V1', 'A');
            INSERT INTO votes(unit, poll_unit, choice) VALUES ('V2', 'P1', 'No');
            INSERT INTO unit_authors VALUES ('V2', 'B');
            INSERT INTO unit_authors VALUES ('V2', 'C');

            INSERT INTO outputs(unit, output_index, address, amount, asset, is_spent)
                VALUES ('O1', 0, 'A', 100, NULL, 0);
            INSERT INTO outputs(unit, output_index, address, amount, asset, is_spent)
                VALUES ('O1', 1, 'A', 20, NULL, 0);
            INSERT INTO outputs(unit, output_index, address, amount, asset, is_spent)
                VALUES ('O1', 2, 'A', 999, 'TOKEN', 0);
            INSERT INTO outputs(unit, output_index, address, amount, asset, is_spent)
                VALUES ('O1', 3, 'B', 50, NULL, 1);

            INSERT INTO attested_fields VALUES ('T1', 0, 'TRUSTED', 'A', 'user_id', 'alice');
            INSERT INTO attested_fields VALUES ('T2', 0, 'TRUSTED', 'B', 'email', 'b@x');
            INSERT INTO attested_fields VALUES ('T3', 0, 'OTHER', 'C', 'user_id', 'carol');
            ",
        )
        .unwrap();
        SqliteLedgerGateway::from_connection(conn)
    }

    #[tokio::test]
    async fn test_whitelisted_polls_newest_first() {
        let ledger = seeded();
        let polls = ledger
            .whitelisted_polls(&[UnitId::from("P1"), UnitId::from("P2"), UnitId::from("NOPE")])
            .await
            .unwrap();
        let units: Vec<_> = polls.iter().map(|p| p.unit.as_str()).collect();
        assert_eq!(units, ["P2", "P1"]);
    }

    #[tokio::test]
    async fn test_question_and_choices() {
        let ledger = seeded();
        assert_eq!(
            ledger.question(&UnitId::from("P1")).await.unwrap().as_deref(),
            Some("Raise the fee?")
        );
        assert_eq!(ledger.question(&UnitId::from("NOPE")).await.unwrap(), None);
        assert_eq!(
            ledger.choices(&UnitId::from("P1")).await.unwrap(),
            vec!["Yes".to_string(), "No".to_string()]
        );
        assert!(ledger.choices(&UnitId::from("P2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vote_rows_one_per_author() {
        let ledger = seeded();
        let rows = ledger.vote_rows(&UnitId::from("P1")).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].address.as_str(), "A");
        assert!(rows[0].sequence < rows[1].sequence);
        assert_eq!(rows[1].sequence, rows[2].sequence);

        assert_eq!(
            ledger.latest_vote_sequence(&UnitId::from("P1")).await.unwrap(),
            Some(rows[2].sequence)
        );
        assert_eq!(
            ledger.latest_vote_sequence(&UnitId::from("P2")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_native_balances() {
        let ledger = seeded();
        let balances = ledger
            .native_balances(&[Address::from("A"), Address::from("B")])
            .await
            .unwrap();
        assert_eq!(balances.get(&Address::from("A")), Some(&120));
        assert!(!balances.contains_key(&Address::from("B")));
    }

    #[tokio::test]
    async fn test_attested_rows_need_user_id_from_trusted_attestor() {
        let ledger = seeded();
        let rows = ledger
            .attested_vote_rows(&UnitId::from("P1"), &[Address::from("TRUSTED")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, "alice");
        assert_eq!(rows[0].choice, "Yes");

        let none = ledger
            .attested_vote_rows(&UnitId::from("P1"), &[])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_large_attestor_set_is_not_truncated() {
        let ledger = seeded();
        let mut attestors: Vec<Address> = (0..1_200)
            .map(|i| Address::new(format!("UNTRUSTED{i}")))
            .collect();
        attestors.push(Address::from("TRUSTED"));
        attestors.push(Address::from("OTHER"));

        let rows = ledger
            .attested_vote_rows(&UnitId::from("P1"), &attestors)
            .await
            .unwrap();
        let users: Vec<_> = rows.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(users, ["alice", "carol"]);
    }

    #[test]
    fn test_open_missing_database_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = SqliteLedgerGateway::open_read_only(dir.path().join("missing.sqlite"));
        assert!(matches!(result, Err(PollBotError::Ledger(_))));
    }
}
