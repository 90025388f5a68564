//! REST facade over the store, the generation adapter, and the hub.
//!
//! Thin query/command surface for clients that do not hold a live channel:
//! the TV lobby listing quizzes, session bootstrap, and post-game queries.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppState;
use crate::generation::GenerateError;
use crate::protocol::{LeaderboardEntry, PlayerInfo, QuestionView, ServerEvent};
use crate::runtime::SessionRuntime;
use crate::store::{NewChoice, NewQuestion, NewQuiz, StoreError};
use crate::types::*;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quizzes/", get(list_quizzes).post(create_quiz))
        .route("/quizzes/generate/", post(generate_quiz))
        .route("/quizzes/{id}/", get(get_quiz))
        .route("/quizzes/{id}/questions/", get(quiz_questions))
        .route("/quizzes/{id}/preview/", get(quiz_preview))
        .route("/sessions/", post(create_session))
        .route("/sessions/{code}/", get(get_session))
        .route("/sessions/{code}/state/", get(session_state))
        .route("/sessions/{code}/current_question/", get(current_question))
        .route("/sessions/{code}/leaderboard/", get(session_leaderboard))
        .route(
            "/sessions/{code}/disconnected_players/",
            get(disconnected_players),
        )
        .route("/players/", post(create_player))
        .route("/players/{id}/become_host/", post(become_host))
        .route("/players/{id}/heartbeat/", post(player_heartbeat))
        .route("/answers/by_session/", get(answers_by_session))
        .route("/answers/by_player/", get(answers_by_player))
}

/// Errors as the REST surface reports them: a status code plus a
/// machine-readable kind in the body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let (status, kind) = match &e {
            StoreError::QuizNotFound
            | StoreError::QuestionNotFound
            | StoreError::ChoiceNotFound
            | StoreError::SessionNotFound
            | StoreError::PlayerNotFound => (StatusCode::NOT_FOUND, "not_found"),
            StoreError::AlreadyHasHost => (StatusCode::CONFLICT, "already_has_host"),
            StoreError::AlreadyAnswered => (StatusCode::CONFLICT, "already_answered"),
            StoreError::QuizLocked => (StatusCode::CONFLICT, "quiz_locked"),
            StoreError::CodeExhausted(_) => (StatusCode::SERVICE_UNAVAILABLE, "code_exhausted"),
            StoreError::InvalidQuiz(_) | StoreError::InvalidQuestion(_) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
        };
        Self {
            status,
            kind,
            message: e.to_string(),
        }
    }
}

impl From<GenerateError> for ApiError {
    fn from(e: GenerateError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "generation_failed",
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "kind": self.kind,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------- Quizzes ----------

/// Quiz as the REST surface presents it: the image falls back to the
/// topic-matched theme.
#[derive(Debug, Serialize)]
struct QuizPayload {
    id: QuizId,
    title: String,
    topic: String,
    description: String,
    image_url: String,
    question_count: u32,
    time_per_question: u32,
    created_at: DateTime<Utc>,
}

impl From<&Quiz> for QuizPayload {
    fn from(q: &Quiz) -> Self {
        Self {
            id: q.id.clone(),
            title: q.title.clone(),
            topic: q.topic.clone(),
            description: q.description.clone(),
            image_url: q.theme_image(),
            question_count: q.question_count,
            time_per_question: q.time_per_question,
            created_at: q.created_at,
        }
    }
}

async fn list_quizzes(State(state): State<Arc<AppState>>) -> Json<Vec<QuizPayload>> {
    let quizzes = state.store.list_quizzes().await;
    Json(quizzes.iter().map(QuizPayload::from).collect())
}

#[derive(Debug, Deserialize)]
struct ChoiceBody {
    text: String,
    is_correct: bool,
}

#[derive(Debug, Deserialize)]
struct QuestionBody {
    text: String,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    time_limit: u32,
    choices: Vec<ChoiceBody>,
}

#[derive(Debug, Deserialize)]
struct CreateQuizBody {
    title: String,
    topic: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    image_url: String,
    #[serde(default = "default_time_per_question")]
    time_per_question: u32,
    /// Manual authoring path; generated quizzes use /quizzes/generate/.
    #[serde(default)]
    questions: Vec<QuestionBody>,
}

fn default_time_per_question() -> u32 {
    20
}

impl QuestionBody {
    fn into_new_question(self) -> NewQuestion {
        NewQuestion {
            text: self.text,
            difficulty: Difficulty::parse(self.difficulty.as_deref().unwrap_or("medium")),
            explanation: self.explanation,
            image_url: self.image_url,
            time_limit: self.time_limit,
            generated_by_model: false,
            choices: self
                .choices
                .into_iter()
                .map(|c| NewChoice {
                    text: c.text,
                    is_correct: c.is_correct,
                })
                .collect(),
        }
    }
}

async fn create_quiz(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateQuizBody>,
) -> ApiResult<(StatusCode, Json<QuizPayload>)> {
    let quiz = state
        .store
        .create_quiz(NewQuiz {
            title: body.title,
            topic: body.topic,
            description: body.description,
            image_url: body.image_url,
            time_per_question: body.time_per_question,
        })
        .await?;

    if !body.questions.is_empty() {
        let questions = body
            .questions
            .into_iter()
            .map(QuestionBody::into_new_question)
            .collect();
        if let Err(e) = state.store.attach_questions(&quiz.id, questions).await {
            // Leave no half-made quiz behind.
            let _ = state.store.delete_quiz(&quiz.id).await;
            return Err(e.into());
        }
    }

    let quiz = state.store.quiz(&quiz.id).await?;
    Ok((StatusCode::CREATED, Json(QuizPayload::from(&quiz))))
}

#[derive(Debug, Deserialize)]
struct GenerateQuizBody {
    topic: String,
    count: u32,
    #[serde(default)]
    description: String,
    #[serde(default = "default_time_per_question")]
    time_per_question: u32,
    #[serde(default = "default_player_count")]
    player_count: u32,
}

fn default_player_count() -> u32 {
    4
}

async fn generate_quiz(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateQuizBody>,
) -> ApiResult<(StatusCode, Json<QuizPayload>)> {
    if body.topic.trim().is_empty() {
        return Err(ApiError::bad_request("topic must not be empty"));
    }
    if !(1..=30).contains(&body.count) {
        return Err(ApiError::bad_request("count must be within 1..=30"));
    }

    let quiz = state
        .store
        .create_quiz(NewQuiz {
            title: body.topic.clone(),
            topic: body.topic.clone(),
            description: body.description,
            image_url: String::new(),
            time_per_question: body.time_per_question,
        })
        .await?;

    let candidates = match state
        .generation
        .questions_for(&body.topic, body.count, body.player_count)
        .await
    {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::error!(topic = %body.topic, error = %e, "quiz generation failed");
            let _ = state.store.delete_quiz(&quiz.id).await;
            return Err(e.into());
        }
    };

    let questions = candidates
        .into_iter()
        .map(|c| NewQuestion {
            text: c.text.clone(),
            difficulty: c.difficulty(),
            explanation: c.explanation.clone(),
            image_url: c.image_url.clone().unwrap_or_default(),
            time_limit: 0,
            generated_by_model: true,
            choices: c
                .choices
                .iter()
                .enumerate()
                .map(|(i, text)| NewChoice {
                    text: text.clone(),
                    is_correct: i == c.correct_index,
                })
                .collect(),
        })
        .collect();

    if let Err(e) = state.store.attach_questions(&quiz.id, questions).await {
        tracing::error!(topic = %body.topic, error = %e, "generated questions rejected by store");
        let _ = state.store.delete_quiz(&quiz.id).await;
        return Err(e.into());
    }

    let quiz = state.store.quiz(&quiz.id).await?;
    Ok((StatusCode::CREATED, Json(QuizPayload::from(&quiz))))
}

async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<QuizPayload>> {
    let quiz = state.store.quiz(&id).await?;
    Ok(Json(QuizPayload::from(&quiz)))
}

async fn quiz_questions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<QuestionView>>> {
    let quiz = state.store.quiz(&id).await?;
    let questions = state.store.quiz_questions(&id).await?;
    Ok(Json(
        questions
            .iter()
            .map(|q| QuestionView::from_question(q, quiz.time_per_question))
            .collect(),
    ))
}

/// Full question rows, correctness and explanations included. Meant for
/// the host reviewing a quiz before starting a session.
async fn quiz_preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Question>>> {
    Ok(Json(state.store.quiz_questions(&id).await?))
}

// ---------- Sessions ----------

#[derive(Debug, Deserialize)]
struct CreateSessionBody {
    quiz: QuizId,
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSessionBody>,
) -> ApiResult<(StatusCode, Json<GameSession>)> {
    let quiz = state.store.quiz(&body.quiz).await?;
    if quiz.question_count == 0 {
        return Err(ApiError::bad_request("quiz has no questions"));
    }

    let session = state.store.create_session(&quiz.id).await?;
    let handle = SessionRuntime::spawn(state.store.clone(), &session, quiz);
    state.hub.register(&session.code, handle).await;

    Ok((StatusCode::CREATED, Json(session)))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Json<GameSession>> {
    Ok(Json(state.store.session_by_code(&code).await?))
}

#[derive(Debug, Serialize)]
struct SessionStatePayload {
    state: SessionState,
    current_question: u32,
    question_count: u32,
    connected_players: u32,
}

async fn session_state(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Json<SessionStatePayload>> {
    let session = state.store.session_by_code(&code).await?;
    let quiz = state.store.quiz(&session.quiz_id).await?;
    let connected = state.store.count_connected_players(&session.id).await?;
    Ok(Json(SessionStatePayload {
        state: session.state,
        current_question: session.current_question,
        question_count: quiz.question_count,
        connected_players: connected,
    }))
}

async fn current_question(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Json<Option<QuestionView>>> {
    let session = state.store.session_by_code(&code).await?;
    let quiz = state.store.quiz(&session.quiz_id).await?;
    let question = state
        .store
        .question_by_index(&session.id, session.current_question)
        .await?;
    Ok(Json(question.map(|q| {
        QuestionView::from_question(&q, quiz.time_per_question)
    })))
}

async fn session_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    let session = state.store.session_by_code(&code).await?;
    let players = state.store.leaderboard(&session.id).await?;
    Ok(Json(players.iter().map(LeaderboardEntry::from).collect()))
}

async fn disconnected_players(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Json<Vec<PlayerInfo>>> {
    let session = state.store.session_by_code(&code).await?;
    let players = state.store.disconnected_players(&session.id).await?;
    Ok(Json(players.iter().map(PlayerInfo::from).collect()))
}

// ---------- Players ----------

#[derive(Debug, Deserialize)]
struct CreatePlayerBody {
    session_code: String,
    name: String,
}

async fn create_player(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePlayerBody>,
) -> ApiResult<(StatusCode, Json<PlayerInfo>)> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let session = state.store.session_by_code(&body.session_code).await?;
    let (player, created) = state
        .store
        .get_or_create_player(&session.id, body.name.trim())
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(PlayerInfo::from(&player))))
}

async fn become_host(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PlayerInfo>> {
    let player = state.store.set_host(&id).await?;
    let session = state.store.session(&player.session_id).await?;

    // Everyone on the live channel learns about the new host too.
    state
        .hub
        .broadcast(
            &session.code,
            ServerEvent::HostAssigned {
                player: PlayerInfo::from(&player),
            },
        )
        .await;

    Ok(Json(PlayerInfo::from(&player)))
}

async fn player_heartbeat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.heartbeat(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------- Answers ----------

#[derive(Debug, Deserialize)]
struct BySessionQuery {
    session_code: String,
}

async fn answers_by_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BySessionQuery>,
) -> ApiResult<Json<Vec<Answer>>> {
    let session = state.store.session_by_code(&query.session_code).await?;
    Ok(Json(state.store.answers_by_session(&session.id).await?))
}

#[derive(Debug, Deserialize)]
struct ByPlayerQuery {
    player_id: String,
}

async fn answers_by_player(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ByPlayerQuery>,
) -> ApiResult<Json<Vec<Answer>>> {
    Ok(Json(state.store.answers_by_player(&query.player_id).await?))
}
