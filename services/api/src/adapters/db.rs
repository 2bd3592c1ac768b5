//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the store ports from the `core` crate. It handles all interactions with the
//! PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use classroom_core::domain::{
    ActivityKind, AnswerKey, Assessment, AssessmentSummary, ClassInfo, CompletionRecord,
    Identity, Question, QuestionVariant, Role, StudentProfile, Subject,
};
use classroom_core::ports::{
    CatalogStore, LedgerStore, PortError, PortResult, RosterStore, SessionStore,
};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every store port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct AssessmentRecord {
    id: Uuid,
    titulo: String,
    descricao: Option<String>,
    materia_id: Uuid,
    turma_id: Uuid,
    professor_id: Uuid,
    data_publicacao: DateTime<Utc>,
    data_entrega: Option<DateTime<Utc>>,
    nota_maxima: f64,
}
impl AssessmentRecord {
    fn to_summary(self) -> AssessmentSummary {
        AssessmentSummary {
            id: self.id,
            title: self.titulo,
            description: self.descricao,
            subject_id: self.materia_id,
            class_id: self.turma_id,
            author_id: self.professor_id,
            published_at: self.data_publicacao,
            due_at: self.data_entrega,
            max_score: self.nota_maxima,
        }
    }
}

const ASSESSMENT_COLUMNS: &str = "c.id, c.titulo, c.descricao, c.materia_id, c.turma_id, \
     c.professor_id, c.data_publicacao, c.data_entrega, a.nota_maxima";

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    enunciado: String,
    tipo: String,
    opcoes: Option<Json<Vec<String>>>,
    resposta_correta: Json<Value>,
}
impl QuestionRecord {
    fn to_domain(self) -> PortResult<Question> {
        let variant = QuestionVariant::from_tag(&self.tipo).ok_or_else(|| {
            PortError::Unexpected(format!("Question {} has unknown type '{}'", self.id, self.tipo))
        })?;
        let key = match self.resposta_correta.0 {
            Value::String(text) => AnswerKey::Text(text),
            Value::Array(items) => AnswerKey::Options(
                items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            other => {
                return Err(PortError::Unexpected(format!(
                    "Question {} has a malformed answer key: {}",
                    self.id, other
                )))
            }
        };
        Ok(Question {
            id: self.id,
            prompt: self.enunciado,
            variant,
            options: self.opcoes.map(|o| o.0).unwrap_or_default(),
            key,
        })
    }
}

fn encode_key(key: &AnswerKey) -> Value {
    match key {
        AnswerKey::Options(set) => Value::Array(set.iter().cloned().map(Value::String).collect()),
        AnswerKey::Text(text) => Value::String(text.clone()),
    }
}

#[derive(FromRow)]
struct CompletionRow {
    id: Uuid,
    aluno_id: Uuid,
    tipo: String,
    conteudo_id: Uuid,
    data_conclusao: DateTime<Utc>,
    nota: Option<f64>,
    nota_maxima: Option<f64>,
    atraso: bool,
}
impl CompletionRow {
    fn to_domain(self) -> PortResult<CompletionRecord> {
        let kind = ActivityKind::from_tag(&self.tipo).ok_or_else(|| {
            PortError::Unexpected(format!("Completion {} has unknown type '{}'", self.id, self.tipo))
        })?;
        Ok(CompletionRecord {
            id: self.id,
            student_id: self.aluno_id,
            assessment_id: self.conteudo_id,
            kind,
            completed_at: self.data_conclusao,
            score: self.nota,
            max_score: self.nota_maxima,
            late: self.atraso,
        })
    }
}

const COMPLETION_COLUMNS: &str =
    "id, aluno_id, tipo, conteudo_id, data_conclusao, nota, nota_maxima, atraso";

fn collect_completions(rows: Vec<CompletionRow>) -> PortResult<Vec<CompletionRecord>> {
    rows.into_iter().map(CompletionRow::to_domain).collect()
}

#[derive(FromRow)]
struct StudentRecord {
    user_id: Uuid,
    matricula: String,
    turma_id: Uuid,
    name: String,
    email: String,
    turma_nome: String,
    serie: String,
}
impl StudentRecord {
    fn to_domain(self) -> StudentProfile {
        StudentProfile {
            id: self.user_id,
            name: self.name,
            email: self.email,
            enrollment: self.matricula,
            class: ClassInfo {
                id: self.turma_id,
                name: self.turma_nome,
                grade: self.serie,
            },
        }
    }
}

#[derive(FromRow)]
struct SubjectRecord {
    id: Uuid,
    nome: String,
    turma_id: Uuid,
    professor_id: Uuid,
}
impl SubjectRecord {
    fn to_domain(self) -> Subject {
        Subject {
            id: self.id,
            name: self.nome,
            class_id: self.turma_id,
            teacher_id: self.professor_id,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    user_id: Uuid,
    role: String,
}

//=========================================================================================
// Assessment write helpers (run inside a transaction)
//=========================================================================================

async fn insert_questions(
    tx: &mut Transaction<'_, Postgres>,
    assessment: &Assessment,
) -> PortResult<()> {
    for (position, question) in assessment.questions.iter().enumerate() {
        let options = if question.variant.is_choice() {
            Some(Json(question.options.clone()))
        } else {
            None
        };
        sqlx::query(
            "INSERT INTO perguntas (id, avaliacao_id, posicao, enunciado, tipo, opcoes, resposta_correta) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(question.id)
        .bind(assessment.id)
        .bind(position as i32)
        .bind(&question.prompt)
        .bind(question.variant.as_tag())
        .bind(options)
        .bind(Json(encode_key(&question.key)))
        .execute(&mut **tx)
        .await
        .map_err(unexpected)?;
    }
    Ok(())
}

//=========================================================================================
// `CatalogStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CatalogStore for DbAdapter {
    async fn get_assessment(&self, assessment_id: Uuid) -> PortResult<Assessment> {
        let record = sqlx::query_as::<_, AssessmentRecord>(&format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM conteudos c \
             JOIN avaliacoes a ON a.id = c.id \
             WHERE c.id = $1 AND c.tipo = 'avaliacao'"
        ))
        .bind(assessment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!(
            "Assessment {} not found",
            assessment_id
        )))?;

        let questions = sqlx::query_as::<_, QuestionRecord>(
            "SELECT id, enunciado, tipo, opcoes, resposta_correta FROM perguntas \
             WHERE avaliacao_id = $1 ORDER BY posicao ASC",
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(QuestionRecord::to_domain)
        .collect::<PortResult<Vec<_>>>()?;

        let summary = record.to_summary();
        Ok(Assessment {
            id: summary.id,
            title: summary.title,
            description: summary.description,
            subject_id: summary.subject_id,
            class_id: summary.class_id,
            author_id: summary.author_id,
            published_at: summary.published_at,
            due_at: summary.due_at,
            max_score: summary.max_score,
            questions,
        })
    }

    async fn list_assessments_for_class(
        &self,
        class_id: Uuid,
    ) -> PortResult<Vec<AssessmentSummary>> {
        let records = sqlx::query_as::<_, AssessmentRecord>(&format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM conteudos c \
             JOIN avaliacoes a ON a.id = c.id \
             WHERE c.turma_id = $1 AND c.tipo = 'avaliacao' \
             ORDER BY c.data_publicacao DESC"
        ))
        .bind(class_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(AssessmentRecord::to_summary).collect())
    }

    async fn list_assessments_by_author(
        &self,
        teacher_id: Uuid,
    ) -> PortResult<Vec<AssessmentSummary>> {
        let records = sqlx::query_as::<_, AssessmentRecord>(&format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM conteudos c \
             JOIN avaliacoes a ON a.id = c.id \
             WHERE c.professor_id = $1 AND c.tipo = 'avaliacao' \
             ORDER BY c.data_publicacao DESC"
        ))
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(AssessmentRecord::to_summary).collect())
    }

    async fn create_assessment(&self, assessment: &Assessment) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO conteudos (id, titulo, descricao, data_publicacao, data_entrega, tipo, turma_id, professor_id, materia_id) \
             VALUES ($1, $2, $3, $4, $5, 'avaliacao', $6, $7, $8)",
        )
        .bind(assessment.id)
        .bind(&assessment.title)
        .bind(&assessment.description)
        .bind(assessment.published_at)
        .bind(assessment.due_at)
        .bind(assessment.class_id)
        .bind(assessment.author_id)
        .bind(assessment.subject_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query("INSERT INTO avaliacoes (id, nota_maxima) VALUES ($1, $2)")
            .bind(assessment.id)
            .bind(assessment.max_score)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        insert_questions(&mut tx, assessment).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn replace_assessment(&self, assessment: &Assessment) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // The row lock conflicts with the key-share lock a ledger insert takes on its
        // referenced content row, so no attempt can land between the count and the write.
        let locked: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM conteudos WHERE id = $1 AND tipo = 'avaliacao' FOR UPDATE",
        )
        .bind(assessment.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;
        if locked.is_none() {
            return Err(PortError::NotFound(format!(
                "Assessment {} not found",
                assessment.id
            )));
        }

        let attempts: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM atividades_concluidas WHERE conteudo_id = $1")
                .bind(assessment.id)
                .fetch_one(&mut *tx)
                .await
                .map_err(unexpected)?;
        if attempts > 0 {
            return Err(PortError::Locked(format!(
                "assessment {} already has {attempts} recorded attempt(s)",
                assessment.id
            )));
        }

        let updated = sqlx::query(
            "UPDATE conteudos SET titulo = $2, descricao = $3, data_entrega = $4, turma_id = $5, materia_id = $6 \
             WHERE id = $1 AND tipo = 'avaliacao'",
        )
        .bind(assessment.id)
        .bind(&assessment.title)
        .bind(&assessment.description)
        .bind(assessment.due_at)
        .bind(assessment.class_id)
        .bind(assessment.subject_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        if updated.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Assessment {} not found",
                assessment.id
            )));
        }

        sqlx::query("UPDATE avaliacoes SET nota_maxima = $2 WHERE id = $1")
            .bind(assessment.id)
            .bind(assessment.max_score)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        sqlx::query("DELETE FROM perguntas WHERE avaliacao_id = $1")
            .bind(assessment.id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        insert_questions(&mut tx, assessment).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn delete_assessment(&self, assessment_id: Uuid) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // Children first: questions, ledger entries, the assessment, its content row.
        for statement in [
            "DELETE FROM perguntas WHERE avaliacao_id = $1",
            "DELETE FROM atividades_concluidas WHERE conteudo_id = $1",
            "DELETE FROM avaliacoes WHERE id = $1",
        ] {
            sqlx::query(statement)
                .bind(assessment_id)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
        }

        let deleted = sqlx::query("DELETE FROM conteudos WHERE id = $1 AND tipo = 'avaliacao'")
            .bind(assessment_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        if deleted.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Assessment {} not found",
                assessment_id
            )));
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `LedgerStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl LedgerStore for DbAdapter {
    async fn insert_if_absent(&self, record: &CompletionRecord) -> PortResult<CompletionRecord> {
        // One conditional statement: the unique (aluno_id, conteudo_id) pair decides.
        let row = sqlx::query_as::<_, CompletionRow>(&format!(
            "INSERT INTO atividades_concluidas ({COMPLETION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (aluno_id, conteudo_id) DO NOTHING \
             RETURNING {COMPLETION_COLUMNS}"
        ))
        .bind(record.id)
        .bind(record.student_id)
        .bind(record.kind.as_tag())
        .bind(record.assessment_id)
        .bind(record.completed_at)
        .bind(record.score)
        .bind(record.max_score)
        .bind(record.late)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match row {
            Some(row) => row.to_domain(),
            None => Err(PortError::Conflict(format!(
                "student {} / assessment {}",
                record.student_id, record.assessment_id
            ))),
        }
    }

    async fn find(
        &self,
        student_id: Uuid,
        assessment_id: Uuid,
    ) -> PortResult<Option<CompletionRecord>> {
        sqlx::query_as::<_, CompletionRow>(&format!(
            "SELECT {COMPLETION_COLUMNS} FROM atividades_concluidas \
             WHERE aluno_id = $1 AND conteudo_id = $2"
        ))
        .bind(student_id)
        .bind(assessment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(CompletionRow::to_domain)
        .transpose()
    }

    async fn list_for_student(
        &self,
        student_id: Uuid,
        kind: ActivityKind,
    ) -> PortResult<Vec<CompletionRecord>> {
        let rows = sqlx::query_as::<_, CompletionRow>(&format!(
            "SELECT {COMPLETION_COLUMNS} FROM atividades_concluidas \
             WHERE aluno_id = $1 AND tipo = $2 ORDER BY data_conclusao ASC"
        ))
        .bind(student_id)
        .bind(kind.as_tag())
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        collect_completions(rows)
    }

    async fn list_for_assessment_ids(
        &self,
        student_id: Uuid,
        assessment_ids: &[Uuid],
    ) -> PortResult<Vec<CompletionRecord>> {
        if assessment_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, CompletionRow>(&format!(
            "SELECT {COMPLETION_COLUMNS} FROM atividades_concluidas \
             WHERE aluno_id = $1 AND conteudo_id = ANY($2)"
        ))
        .bind(student_id)
        .bind(assessment_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        collect_completions(rows)
    }

    async fn count_for_assessment(&self, assessment_id: Uuid) -> PortResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM atividades_concluidas WHERE conteudo_id = $1")
                .bind(assessment_id)
                .fetch_one(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(count.max(0) as u64)
    }
}

//=========================================================================================
// `RosterStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RosterStore for DbAdapter {
    async fn get_student(&self, student_id: Uuid) -> PortResult<StudentProfile> {
        let record = sqlx::query_as::<_, StudentRecord>(
            "SELECT al.user_id, al.matricula, al.turma_id, u.name, u.email, \
                    t.nome AS turma_nome, t.serie \
             FROM alunos al \
             JOIN usuarios u ON u.id = al.user_id \
             JOIN turmas t ON t.id = al.turma_id \
             WHERE al.user_id = $1",
        )
        .bind(student_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!(
            "Student {} not found",
            student_id
        )))?;
        Ok(record.to_domain())
    }

    async fn list_student_ids_in_class(&self, class_id: Uuid) -> PortResult<Vec<Uuid>> {
        sqlx::query_scalar("SELECT user_id FROM alunos WHERE turma_id = $1 ORDER BY matricula")
            .bind(class_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn list_children(&self, guardian_id: Uuid) -> PortResult<Vec<Uuid>> {
        sqlx::query_scalar(
            "SELECT user_id FROM alunos WHERE responsavel_id = $1 ORDER BY matricula",
        )
        .bind(guardian_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn list_subjects_for_class(&self, class_id: Uuid) -> PortResult<Vec<Subject>> {
        let records = sqlx::query_as::<_, SubjectRecord>(
            "SELECT id, nome, turma_id, professor_id FROM materias WHERE turma_id = $1 ORDER BY nome",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(SubjectRecord::to_domain).collect())
    }

    async fn teaches_class(&self, teacher_id: Uuid, class_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM materias WHERE turma_id = $1 AND professor_id = $2)",
        )
        .bind(class_id)
        .bind(teacher_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }
}

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for DbAdapter {
    async fn resolve_session(&self, token: &str) -> PortResult<Identity> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT u.id AS user_id, u.role FROM sessoes s \
             JOIN usuarios u ON u.id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)?;

        let role = Role::from_tag(&record.role).ok_or_else(|| {
            PortError::Unexpected(format!("User {} has unknown role '{}'", record.user_id, record.role))
        })?;
        Ok(Identity::new(record.user_id, role))
    }
}
