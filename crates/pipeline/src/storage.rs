//! SQLite 이벤트/알림 저장소
//!
//! 인덱서(배치 쓰기)와 룰 엔진(알림 쓰기)이 각자 자기 [`EventStore`]
//! 인스턴스를 소유합니다. 트랜잭션은 작업 단위마다 획득/해제되며
//! 채널 대기 중에 유지되지 않습니다.
//!
//! 조회 인터페이스(필터/페이지네이션/확인 처리)는 외부 조회 표면이
//! 소비하는 공개 계약입니다.

use std::net::IpAddr;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};

use palisade_core::types::{Alert, NewAlert, NormalizedEvent, PersistedEvent};

use crate::error::SiemError;

/// 이벤트 조회 필터
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// 심각도 코드 (0~7)
    pub severity: Option<u8>,
    /// 송신 측 IP
    pub source_ip: Option<String>,
    /// 수신 시각 하한 (포함)
    pub start: Option<DateTime<Utc>>,
    /// 수신 시각 상한 (포함)
    pub end: Option<DateTime<Utc>>,
}

/// 알림 조회 필터
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    /// 확인 여부
    pub acknowledged: Option<bool>,
    /// 심각도 라벨
    pub severity: Option<String>,
}

/// 저장소 통계
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// 저장된 이벤트 수
    pub event_count: u64,
    /// 생성된 알림 수
    pub alert_count: u64,
    /// 미확인 알림 수
    pub unacknowledged_alerts: u64,
}

/// SQLite 기반 이벤트/알림 저장소
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// 파일 경로에 저장소를 엽니다. 스키마가 없으면 생성합니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SiemError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// 인메모리 저장소를 엽니다 (테스트용).
    pub fn open_in_memory() -> Result<Self, SiemError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), SiemError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                raw           TEXT NOT NULL,
                pattern       TEXT NOT NULL,
                priority      INTEGER,
                facility      INTEGER,
                severity      INTEGER,
                severity_name TEXT,
                log_timestamp TEXT,
                hostname      TEXT,
                process       TEXT,
                pid           TEXT,
                app_name      TEXT,
                message       TEXT NOT NULL,
                source_ip     TEXT NOT NULL,
                source_port   INTEGER NOT NULL,
                received_at   TEXT NOT NULL,
                parsed_at     TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_received_at ON events(received_at);
            CREATE INDEX IF NOT EXISTS idx_events_severity ON events(severity);
            CREATE INDEX IF NOT EXISTS idx_events_source_ip ON events(source_ip);

            CREATE TABLE IF NOT EXISTS alerts (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                rule_id         TEXT NOT NULL,
                rule_name       TEXT NOT NULL,
                severity        TEXT NOT NULL,
                description     TEXT NOT NULL,
                event_id        INTEGER REFERENCES events(id),
                source_ip       TEXT,
                destination_ip  TEXT,
                acknowledged    INTEGER NOT NULL DEFAULT 0,
                acknowledged_by TEXT,
                acknowledged_at TEXT,
                created_at      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_acknowledged ON alerts(acknowledged);",
        )?;
        Ok(())
    }

    /// 이벤트 배치를 하나의 트랜잭션으로 삽입합니다.
    ///
    /// 커밋 성공 시 삽입 순서대로 부여된 식별자 목록을 반환합니다.
    /// 중간에 하나라도 실패하면 전체가 롤백되고 에러가 반환됩니다.
    pub fn insert_batch(&mut self, events: &[NormalizedEvent]) -> Result<Vec<i64>, SiemError> {
        let tx = self.conn.transaction()?;
        let mut ids = Vec::with_capacity(events.len());

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO events (
                    raw, pattern, priority, facility, severity, severity_name,
                    log_timestamp, hostname, process, pid, app_name, message,
                    source_ip, source_port, received_at, parsed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            )?;

            for event in events {
                stmt.execute(params![
                    event.raw,
                    event.pattern,
                    event.priority,
                    event.facility,
                    event.severity,
                    event.severity_name,
                    event.timestamp,
                    event.hostname,
                    event.process,
                    event.pid,
                    event.app_name,
                    event.message,
                    event.source_ip.to_string(),
                    event.source_port,
                    event.received_at.to_rfc3339(),
                    event.parsed_at.to_rfc3339(),
                ])?;
                ids.push(tx.last_insert_rowid());
            }
        }

        tx.commit()?;
        Ok(ids)
    }

    /// 알림을 저장하고 부여된 식별자를 반환합니다.
    ///
    /// 단일 행 삽입으로, 실패는 호출자에게 그대로 보고됩니다.
    pub fn save_alert(&self, alert: &NewAlert) -> Result<i64, SiemError> {
        self.conn.execute(
            "INSERT INTO alerts (
                rule_id, rule_name, severity, description,
                event_id, source_ip, destination_ip, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                alert.rule_id,
                alert.rule_name,
                alert.severity,
                alert.description,
                alert.event_id,
                alert.source_ip,
                alert.destination_ip,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 이벤트를 필터/페이지네이션 조건으로 조회합니다.
    ///
    /// 수신 시각 내림차순으로 정렬됩니다.
    pub fn query_events(
        &self,
        filter: &EventFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PersistedEvent>, SiemError> {
        let mut sql = String::from("SELECT * FROM events WHERE 1=1");
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(severity) = filter.severity {
            sql.push_str(" AND severity = ?");
            values.push(Box::new(severity));
        }
        if let Some(ref source_ip) = filter.source_ip {
            sql.push_str(" AND source_ip = ?");
            values.push(Box::new(source_ip.clone()));
        }
        if let Some(start) = filter.start {
            sql.push_str(" AND received_at >= ?");
            values.push(Box::new(start.to_rfc3339()));
        }
        if let Some(end) = filter.end {
            sql.push_str(" AND received_at <= ?");
            values.push(Box::new(end.to_rfc3339()));
        }

        sql.push_str(" ORDER BY received_at DESC LIMIT ? OFFSET ?");
        values.push(Box::new(limit as i64));
        values.push(Box::new(offset as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(&param_refs[..], row_to_event)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// 식별자로 이벤트를 조회합니다.
    pub fn get_event(&self, id: i64) -> Result<Option<PersistedEvent>, SiemError> {
        let event = self
            .conn
            .prepare("SELECT * FROM events WHERE id = ?1")?
            .query_row(params![id], row_to_event)
            .optional()?;
        Ok(event)
    }

    /// 알림을 필터 조건으로 조회합니다. 생성 시각 내림차순입니다.
    pub fn query_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, SiemError> {
        let mut sql = String::from("SELECT * FROM alerts WHERE 1=1");
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(acknowledged) = filter.acknowledged {
            sql.push_str(" AND acknowledged = ?");
            values.push(Box::new(acknowledged as i64));
        }
        if let Some(ref severity) = filter.severity {
            sql.push_str(" AND severity = ?");
            values.push(Box::new(severity.clone()));
        }

        sql.push_str(" ORDER BY created_at DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(&param_refs[..], row_to_alert)?;

        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?);
        }
        Ok(alerts)
    }

    /// 알림을 확인 처리합니다.
    ///
    /// 이미 확인된 알림이거나 존재하지 않으면 `false`를 반환합니다.
    pub fn acknowledge_alert(&self, id: i64, who: &str) -> Result<bool, SiemError> {
        let changed = self.conn.execute(
            "UPDATE alerts SET acknowledged = 1, acknowledged_by = ?1, acknowledged_at = ?2
             WHERE id = ?3 AND acknowledged = 0",
            params![who, Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }

    /// 저장소 통계를 반환합니다.
    pub fn stats(&self) -> Result<StoreStats, SiemError> {
        let event_count: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        let alert_count: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?;
        let unacknowledged_alerts: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE acknowledged = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(StoreStats {
            event_count,
            alert_count,
            unacknowledged_alerts,
        })
    }
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_ip(idx: usize, value: String) -> rusqlite::Result<IpAddr> {
    value.parse::<IpAddr>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<PersistedEvent> {
    Ok(PersistedEvent {
        id: row.get("id")?,
        event: NormalizedEvent {
            raw: row.get("raw")?,
            pattern: row.get("pattern")?,
            priority: row.get("priority")?,
            facility: row.get("facility")?,
            severity: row.get("severity")?,
            severity_name: row.get("severity_name")?,
            timestamp: row.get("log_timestamp")?,
            hostname: row.get("hostname")?,
            process: row.get("process")?,
            pid: row.get("pid")?,
            app_name: row.get("app_name")?,
            message: row.get("message")?,
            source_ip: parse_ip(13, row.get("source_ip")?)?,
            source_port: row.get("source_port")?,
            received_at: parse_timestamp(15, row.get("received_at")?)?,
            parsed_at: parse_timestamp(16, row.get("parsed_at")?)?,
        },
    })
}

fn row_to_alert(row: &Row<'_>) -> rusqlite::Result<Alert> {
    let acknowledged_at: Option<String> = row.get("acknowledged_at")?;
    Ok(Alert {
        id: row.get("id")?,
        rule_id: row.get("rule_id")?,
        rule_name: row.get("rule_name")?,
        severity: row.get("severity")?,
        description: row.get("description")?,
        event_id: row.get("event_id")?,
        source_ip: row.get("source_ip")?,
        destination_ip: row.get("destination_ip")?,
        acknowledged: row.get::<_, i64>("acknowledged")? != 0,
        acknowledged_by: row.get("acknowledged_by")?,
        acknowledged_at: acknowledged_at.map(|s| parse_timestamp(10, s)).transpose()?,
        created_at: parse_timestamp(11, row.get("created_at")?)?,
    })
}
