use crate::engine::{MarkRecord, MarkRow};
use crate::store::{
    NewStudent, Store, StoreError, Student, StudentFilter, StudentPatch, WriteOp,
};
use clap::ValueEnum;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "nodues.sqlite3";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SchemaMode {
    /// Add missing optional columns on open.
    #[default]
    Migrate,
    /// Leave existing tables alone and work with whatever columns they have.
    Probe,
}

/// Optional columns present in the opened database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaCaps {
    pub students_has_department: bool,
    pub students_has_semester: bool,
    pub marks_has_clearance_fields: bool,
}

impl Default for SchemaCaps {
    fn default() -> Self {
        Self {
            students_has_department: true,
            students_has_semester: true,
            marks_has_clearance_fields: true,
        }
    }
}

impl SchemaCaps {
    pub fn is_complete(&self) -> bool {
        self.students_has_department && self.students_has_semester && self.marks_has_clearance_fields
    }
}

pub fn open_db(workspace: &Path, mode: SchemaMode) -> anyhow::Result<(Connection, SchemaCaps)> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            register_number TEXT NOT NULL UNIQUE,
            department TEXT,
            year INTEGER NOT NULL,
            semester INTEGER,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            iat1 INTEGER,
            iat2 INTEGER,
            model INTEGER,
            signed INTEGER NOT NULL DEFAULT 0,
            assignment_submitted INTEGER NOT NULL DEFAULT 0,
            department_fine INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, subject)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student ON marks(student_id)",
        [],
    )?;

    if mode == SchemaMode::Migrate {
        ensure_students_placement_columns(&conn)?;
        ensure_marks_clearance_columns(&conn)?;
    }

    let caps = probe_caps(&conn)?;
    if !caps.is_complete() {
        tracing::warn!(?caps, "database schema is missing optional columns");
    }
    Ok((conn, caps))
}

pub fn probe_caps(conn: &Connection) -> anyhow::Result<SchemaCaps> {
    Ok(SchemaCaps {
        students_has_department: table_has_column(conn, "students", "department")?,
        students_has_semester: table_has_column(conn, "students", "semester")?,
        marks_has_clearance_fields: table_has_column(conn, "marks", "assignment_submitted")?
            && table_has_column(conn, "marks", "department_fine")?,
    })
}

/// Statements that bring an older database up to the current schema.
pub fn migration_sql() -> &'static str {
    "ALTER TABLE students ADD COLUMN department TEXT;
ALTER TABLE students ADD COLUMN semester INTEGER;
ALTER TABLE marks ADD COLUMN assignment_submitted INTEGER NOT NULL DEFAULT 0;
ALTER TABLE marks ADD COLUMN department_fine INTEGER NOT NULL DEFAULT 0;
UPDATE marks SET assignment_submitted = 0 WHERE assignment_submitted IS NULL;
UPDATE marks SET department_fine = 0 WHERE department_fine IS NULL;"
}

fn ensure_students_placement_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "students", "department")? {
        conn.execute("ALTER TABLE students ADD COLUMN department TEXT", [])?;
    }
    if !table_has_column(conn, "students", "semester")? {
        conn.execute("ALTER TABLE students ADD COLUMN semester INTEGER", [])?;
    }
    Ok(())
}

fn ensure_marks_clearance_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "marks", "assignment_submitted")? {
        conn.execute(
            "ALTER TABLE marks ADD COLUMN assignment_submitted INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !table_has_column(conn, "marks", "department_fine")? {
        conn.execute(
            "ALTER TABLE marks ADD COLUMN department_fine INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    // Columns that predate the NOT NULL defaults may still hold NULLs.
    conn.execute(
        "UPDATE marks SET assignment_submitted = 0 WHERE assignment_submitted IS NULL",
        [],
    )?;
    conn.execute(
        "UPDATE marks SET department_fine = 0 WHERE department_fine IS NULL",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
    caps: SchemaCaps,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection, caps: SchemaCaps) -> Self {
        Self { conn, caps }
    }

    fn student_columns(&self) -> String {
        format!(
            "id, name, register_number, {}, year, {}, created_at",
            if self.caps.students_has_department {
                "department"
            } else {
                "NULL"
            },
            if self.caps.students_has_semester {
                "semester"
            } else {
                "NULL"
            },
        )
    }

    fn find_student_where(&self, column: &str, value: &str) -> Result<Option<Student>, StoreError> {
        let sql = format!(
            "SELECT {} FROM students WHERE {} = ?",
            self.student_columns(),
            column
        );
        let student = self
            .conn
            .query_row(&sql, [value], student_from_row)
            .optional()?;
        Ok(student)
    }
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        name: row.get(1)?,
        register_number: row.get(2)?,
        department: row.get::<_, Option<String>>(3)?.and_then(non_empty),
        year: row.get(4)?,
        semester: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation
    )
}

impl Store for SqliteStore<'_> {
    fn find_student_by_register_number(
        &self,
        register_number: &str,
    ) -> Result<Option<Student>, StoreError> {
        self.find_student_where("register_number", register_number)
    }

    fn find_student_by_id(&self, id: &str) -> Result<Option<Student>, StoreError> {
        self.find_student_where("id", id)
    }

    fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, StoreError> {
        let mut sql = format!("SELECT {} FROM students", self.student_columns());
        let mut bind: Vec<Value> = Vec::new();
        if let Some(year) = filter.year {
            sql.push_str(" WHERE year = ?");
            bind.push(Value::Integer(year));
        }
        sql.push_str(" ORDER BY register_number");

        let mut stmt = self.conn.prepare(&sql)?;
        let students = stmt
            .query_map(params_from_iter(bind), student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        // Without a semester column every student has an unknown semester.
        Ok(match filter.semester {
            Some(sem) => students
                .into_iter()
                .filter(|s| s.semester == Some(sem))
                .collect(),
            None => students,
        })
    }

    fn find_marks_by_student_id(&self, student_id: &str) -> Result<Vec<MarkRow>, StoreError> {
        let clearance = if self.caps.marks_has_clearance_fields {
            "assignment_submitted, department_fine"
        } else {
            "NULL, NULL"
        };
        let sql = format!(
            "SELECT subject, iat1, iat2, model, signed, {clearance}
             FROM marks
             WHERE student_id = ?
             ORDER BY rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([student_id], |row| {
                Ok(MarkRow {
                    subject: row.get(0)?,
                    iat1: row.get(1)?,
                    iat2: row.get(2)?,
                    model: row.get(3)?,
                    signed: row.get(4)?,
                    assignment_submitted: row.get(5)?,
                    department_fine: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn upsert_mark(&self, student_id: &str, record: &MarkRecord) -> Result<(), StoreError> {
        let mut columns = vec!["id", "student_id", "subject", "iat1", "iat2", "model", "signed"];
        let mut values = vec![
            Value::Text(Uuid::new_v4().to_string()),
            Value::Text(student_id.to_string()),
            Value::Text(record.subject.clone()),
            record.iat1.map(Value::Integer).unwrap_or(Value::Null),
            record.iat2.map(Value::Integer).unwrap_or(Value::Null),
            record.model.map(Value::Integer).unwrap_or(Value::Null),
            Value::Integer(record.signed as i64),
        ];
        if self.caps.marks_has_clearance_fields {
            columns.extend(["assignment_submitted", "department_fine"]);
            values.push(Value::Integer(record.assignment_submitted as i64));
            values.push(Value::Integer(record.department_fine));
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let updates = columns[3..]
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO marks({}) VALUES({})
             ON CONFLICT(student_id, subject) DO UPDATE SET {}",
            columns.join(", "),
            placeholders,
            updates
        );
        self.conn
            .execute(&sql, params_from_iter(values))
            .map_err(StoreError::write("marks", WriteOp::Insert))?;
        Ok(())
    }

    fn insert_student(&self, student: &NewStudent) -> Result<Student, StoreError> {
        if self
            .find_student_by_register_number(&student.register_number)?
            .is_some()
        {
            return Err(StoreError::DuplicateRegisterNumber(
                student.register_number.clone(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let mut columns = vec!["id", "name", "register_number", "year", "created_at"];
        let mut values = vec![
            Value::Text(id.clone()),
            Value::Text(student.name.clone()),
            Value::Text(student.register_number.clone()),
            Value::Integer(student.year),
            Value::Text(created_at.clone()),
        ];
        if self.caps.students_has_department {
            columns.push("department");
            values.push(student.department.clone().map(Value::Text).unwrap_or(Value::Null));
        }
        if self.caps.students_has_semester {
            columns.push("semester");
            values.push(student.semester.map(Value::Integer).unwrap_or(Value::Null));
        }

        let sql = format!(
            "INSERT INTO students({}) VALUES({})",
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        );
        self.conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateRegisterNumber(student.register_number.clone())
                } else {
                    StoreError::write("students", WriteOp::Insert)(e)
                }
            })?;

        Ok(Student {
            id,
            name: student.name.clone(),
            register_number: student.register_number.clone(),
            department: if self.caps.students_has_department {
                student.department.clone()
            } else {
                None
            },
            year: student.year,
            semester: if self.caps.students_has_semester {
                student.semester
            } else {
                None
            },
            created_at,
        })
    }

    fn update_student(&self, id: &str, patch: &StudentPatch) -> Result<(), StoreError> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(name) = &patch.name {
            sets.push("name = ?");
            values.push(Value::Text(name.clone()));
        }
        if let Some(year) = patch.year {
            sets.push("year = ?");
            values.push(Value::Integer(year));
        }
        if let (Some(department), true) = (&patch.department, self.caps.students_has_department)
        {
            sets.push("department = ?");
            values.push(department.clone().map(Value::Text).unwrap_or(Value::Null));
        }
        if let (Some(semester), true) = (patch.semester, self.caps.students_has_semester) {
            sets.push("semester = ?");
            values.push(semester.map(Value::Integer).unwrap_or(Value::Null));
        }

        if sets.is_empty() {
            return match self.find_student_by_id(id)? {
                Some(_) => Ok(()),
                None => Err(StoreError::StudentNotFound(id.to_string())),
            };
        }

        values.push(Value::Text(id.to_string()));
        let sql = format!("UPDATE students SET {} WHERE id = ?", sets.join(", "));
        let changed = self
            .conn
            .execute(&sql, params_from_iter(values))
            .map_err(StoreError::write("students", WriteOp::Update))?;
        if changed == 0 {
            return Err(StoreError::StudentNotFound(id.to_string()));
        }
        Ok(())
    }
}
