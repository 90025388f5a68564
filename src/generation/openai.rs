use super::*;
use serde::Deserialize;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};

/// Question generator backed by any OpenAI-compatible chat endpoint.
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerator {
    /// `api_base` may point at a local OpenAI-compatible server, in which
    /// case the key is typically ignored by the endpoint.
    pub fn new(api_key: String, api_base: String, model: String) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        let client = Client::with_config(config);

        Self { client, model }
    }
}

fn build_user_prompt(request: &GenerateRequest) -> String {
    let curve = request
        .curve
        .iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Topic: {topic}\n\
         Write {count} multiple-choice trivia questions for a party of \
         {players} players.\n\
         Difficulty per question, in order: {curve}.\n\
         Questions must be at most 200 characters, choices at most 40, \
         explanations at most 300.",
        topic = request.topic,
        count = request.count,
        players = request.player_count,
        curve = curve,
    )
}

const SYSTEM_PROMPT: &str = "You write trivia quizzes. Respond with JSON only, no prose and no \
     code fences: an object {\"questions\": [...]} where each question is \
     {\"text\": string, \"choices\": [four distinct short strings], \
     \"correct_index\": 0-3, \"difficulty\": string, \"explanation\": string}. \
     Choices must not reveal the answer by length or phrasing.";

/// Pull the candidate list out of a model reply. Accepts either the
/// requested wrapper object or a bare array, with optional code fences.
fn parse_reply(content: &str) -> GenerateResult<Vec<CandidateQuestion>> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    #[derive(Deserialize)]
    struct Wrapper {
        questions: Vec<CandidateQuestion>,
    }

    if let Ok(w) = serde_json::from_str::<Wrapper>(trimmed) {
        return Ok(w.questions);
    }
    serde_json::from_str::<Vec<CandidateQuestion>>(trimmed)
        .map_err(|e| GenerateError::Parse(format!("unusable model reply: {}", e)))
}

#[async_trait]
impl QuestionGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerateRequest) -> GenerateResult<Vec<CandidateQuestion>> {
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_PROMPT)
                    .build()
                    .map_err(|e| GenerateError::Api(e.to_string()))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(build_user_prompt(request))
                    .build()
                    .map_err(|e| GenerateError::Api(e.to_string()))?
                    .into(),
            ])
            .build()
            .map_err(|e| GenerateError::Api(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| GenerateError::Api(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| GenerateError::Parse("no content in response".to_string()))?;

        parse_reply(&content)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_wrapper_object() {
        let reply = r#"{"questions":[{"text":"Red planet?","choices":["Mars","Venus","Io","Puck"],"correct_index":0,"difficulty":"easy","explanation":"Iron oxide."}]}"#;
        let questions = parse_reply(reply).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_index, 0);
        assert_eq!(questions[0].difficulty(), Difficulty::Easy);
    }

    #[test]
    fn test_parse_reply_bare_array_with_fences() {
        let reply = "```json\n[{\"text\":\"Q\",\"choices\":[\"a\",\"b\",\"c\",\"d\"],\"correct_index\":2,\"difficulty\":\"weird\"}]\n```";
        let questions = parse_reply(reply).unwrap();
        assert_eq!(questions[0].correct_index, 2);
        // Unknown difficulty strings degrade to medium.
        assert_eq!(questions[0].difficulty(), Difficulty::Medium);
    }

    #[test]
    fn test_parse_reply_rejects_prose() {
        assert!(matches!(
            parse_reply("Sure! Here are your questions: ..."),
            Err(GenerateError::Parse(_))
        ));
    }

    #[test]
    fn test_user_prompt_carries_curve() {
        let request = GenerateRequest {
            topic: "Oceans".into(),
            count: 3,
            curve: vec![Difficulty::Easy, Difficulty::Medium, Difficulty::Hard],
            player_count: 4,
        };
        let prompt = build_user_prompt(&request);
        assert!(prompt.contains("Oceans"));
        assert!(prompt.contains("easy, medium, hard"));
        assert!(prompt.contains("4 players"));
    }
}
