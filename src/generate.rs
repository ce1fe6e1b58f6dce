//! Quiz and study-content generation on top of [`LlmClient`].
//!
//! The model is asked for JSON. Anything that goes wrong on the way (no API
//! key, transport error, non-2xx, prose instead of JSON, structurally invalid
//! questions) ends in the static samples below, so callers always get content.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::llm::{LlmClient, LlmError, Message, Sampling};

const QUIZ_SYSTEM_PROMPT: &str = "You are an expert educational content creator specializing in creating high-quality quiz questions for NCERT curriculum.";
const CONTENT_SYSTEM_PROMPT: &str = "You are an expert educational content creator specializing in creating engaging study materials for NCERT curriculum.";

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid question {index}: {reason}")]
    InvalidQuestion { index: usize, reason: &'static str },
    #[error("reply contained no questions")]
    Empty,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneratedQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: i32,
    pub explanation: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneratedContent {
    pub title: String,
    pub content: String,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Llm,
    Fallback,
}

#[derive(Debug, Clone, Default)]
pub struct SyllabusContext {
    pub topics: Vec<String>,
    pub learning_objectives: Vec<String>,
}

impl SyllabusContext {
    pub fn render(&self) -> String {
        if self.topics.is_empty() && self.learning_objectives.is_empty() {
            return String::new();
        }
        format!(
            "Topics: {}\nLearning Objectives: {}",
            self.topics.join(", "),
            self.learning_objectives.join(", ")
        )
    }
}

pub struct QuizPlan<'a> {
    pub subject: &'a str,
    pub chapter: &'a str,
    pub topic: Option<&'a str>,
    pub difficulty: &'a str,
    pub count: usize,
}

pub struct ContentPlan<'a> {
    pub subject: &'a str,
    pub chapter: &'a str,
    pub topic: Option<&'a str>,
    pub content_type: &'a str,
    pub difficulty: &'a str,
}

fn topic_suffix(topic: Option<&str>) -> String {
    match topic.filter(|t| !t.is_empty()) {
        Some(t) => format!(", Topic: {t}"),
        None => String::new(),
    }
}

pub fn quiz_prompt(plan: &QuizPlan<'_>, ctx: &SyllabusContext) -> String {
    format!(
        r#"Generate {count} multiple choice questions for {subject} - Chapter: {chapter}{topic}.
Difficulty level: {difficulty}

Syllabus Context:
{context}

Requirements:
- Each question should have 4 options (A, B, C, D)
- Provide clear explanations for correct answers
- Questions should test understanding, not just memorization
- Include a mix of conceptual and problem-solving questions
- Make questions appropriate for {difficulty} difficulty level

Format each question as JSON:
{{
  "question": "Question text here?",
  "options": ["Option A", "Option B", "Option C", "Option D"],
  "correct_answer": 0,
  "explanation": "Explanation of why this is correct"
}}

Return only the JSON array of questions."#,
        count = plan.count,
        subject = plan.subject,
        chapter = plan.chapter,
        topic = topic_suffix(plan.topic),
        difficulty = plan.difficulty,
        context = ctx.render(),
    )
}

pub fn content_prompt(plan: &ContentPlan<'_>, ctx: &SyllabusContext) -> String {
    format!(
        r#"Create comprehensive study content for {subject} - Chapter: {chapter}{topic}.
Content Type: {content_type}
Difficulty Level: {difficulty}

Syllabus Context:
{context}

Requirements:
- Make content engaging and easy to understand
- Include examples and explanations
- Use appropriate language for {difficulty} level
- Structure content with clear headings
- Include key concepts and definitions
- Add practice problems or exercises if relevant
- Estimated reading time: 15-20 minutes

Format the response as JSON:
{{
  "title": "Chapter Title - Topic Name",
  "content": "Formatted content with markdown...",
  "duration_minutes": 15
}}

Return only the JSON object."#,
        subject = plan.subject,
        chapter = plan.chapter,
        topic = topic_suffix(plan.topic),
        content_type = plan.content_type,
        difficulty = plan.difficulty,
        context = ctx.render(),
    )
}

/// Cuts the JSON value out of a model reply: drops code fences and any
/// prose before the first `[`/`{` or after the matching last bracket.
pub fn extract_json(reply: &str) -> &str {
    let trimmed = reply.trim();
    let start = trimmed.find(['[', '{']);
    let end = trimmed.rfind([']', '}']);
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &trimmed[s..=e],
        _ => trimmed,
    }
}

#[derive(Deserialize)]
struct RawQuestion {
    #[serde(default)]
    question: String,
    #[serde(default)]
    options: Vec<Value>,
    correct_answer: Option<Value>,
    explanation: Option<String>,
}

pub fn parse_quiz_questions(reply: &str) -> Result<Vec<GeneratedQuestion>, GenerateError> {
    let raw: Vec<RawQuestion> = match serde_json::from_str::<Value>(extract_json(reply))? {
        // some models wrap the array: {"questions": [...]}
        Value::Object(mut map) if map.contains_key("questions") => {
            serde_json::from_value(map.remove("questions").unwrap_or(Value::Null))?
        }
        other => serde_json::from_value(other)?,
    };
    if raw.is_empty() {
        return Err(GenerateError::Empty);
    }

    raw.into_iter()
        .enumerate()
        .map(|(index, q)| {
            let invalid = |reason| GenerateError::InvalidQuestion { index, reason };
            if q.question.trim().is_empty() {
                return Err(invalid("empty question text"));
            }
            let options: Vec<String> = q
                .options
                .into_iter()
                .map(|o| match o {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect();
            if options.len() < 2 {
                return Err(invalid("fewer than two options"));
            }
            let answer = match q.correct_answer {
                Some(Value::Number(n)) => n.as_i64(),
                Some(Value::String(s)) => answer_from_str(&s, &options),
                _ => None,
            }
            .ok_or_else(|| invalid("missing correct_answer"))?;
            if answer < 0 || answer as usize >= options.len() {
                return Err(invalid("correct_answer out of range"));
            }
            Ok(GeneratedQuestion {
                question: q.question.trim().to_string(),
                options,
                correct_answer: answer as i32,
                explanation: q
                    .explanation
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| format!("This is the correct answer for question {}", index + 1)),
            })
        })
        .collect()
}

/// Accepts `"2"`, `"C"` or the option text itself.
fn answer_from_str(s: &str, options: &[String]) -> Option<i64> {
    let s = s.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    if s.len() == 1 {
        let c = s.chars().next()?.to_ascii_uppercase();
        if c.is_ascii_uppercase() {
            return Some((c as u8 - b'A') as i64);
        }
    }
    options.iter().position(|o| o == s).map(|i| i as i64)
}

#[derive(Deserialize)]
struct RawContent {
    title: String,
    content: String,
    duration_minutes: Option<i32>,
}

pub fn parse_study_content(reply: &str) -> Result<GeneratedContent, GenerateError> {
    let raw: RawContent = serde_json::from_str(extract_json(reply))?;
    Ok(GeneratedContent {
        title: raw.title,
        content: raw.content,
        duration_minutes: raw.duration_minutes.filter(|m| *m > 0).unwrap_or(15),
    })
}

pub async fn generate_quiz(
    llm: &LlmClient,
    plan: &QuizPlan<'_>,
    ctx: &SyllabusContext,
) -> (Vec<GeneratedQuestion>, Source) {
    let messages = [Message::system(QUIZ_SYSTEM_PROMPT), Message::user(quiz_prompt(plan, ctx))];
    let sampling = Sampling { temperature: 0.7, max_tokens: 2000 };

    let result = match llm.complete(&llm.generation_model, &messages, sampling).await {
        Ok(reply) => parse_quiz_questions(&reply),
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(mut questions) => {
            questions.truncate(plan.count);
            (questions, Source::Llm)
        }
        Err(e) => {
            tracing::warn!(error = %e, subject = plan.subject, chapter = plan.chapter, "quiz generation fell back to samples");
            (sample_questions(plan.subject, plan.count), Source::Fallback)
        }
    }
}

pub async fn generate_content(
    llm: &LlmClient,
    plan: &ContentPlan<'_>,
    ctx: &SyllabusContext,
) -> (GeneratedContent, Source) {
    let messages = [Message::system(CONTENT_SYSTEM_PROMPT), Message::user(content_prompt(plan, ctx))];
    let sampling = Sampling { temperature: 0.7, max_tokens: 3000 };

    let result = match llm.complete(&llm.generation_model, &messages, sampling).await {
        Ok(reply) => parse_study_content(&reply),
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(content) => (content, Source::Llm),
        Err(e) => {
            tracing::warn!(error = %e, subject = plan.subject, chapter = plan.chapter, "content generation fell back to sample");
            (sample_content(plan.subject, plan.chapter, plan.topic), Source::Fallback)
        }
    }
}

// --- static fallbacks ---

fn question(q: &str, options: [&str; 4], explanation: &str) -> GeneratedQuestion {
    GeneratedQuestion {
        question: q.into(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct_answer: 0,
        explanation: explanation.into(),
    }
}

pub fn sample_questions(subject: &str, count: usize) -> Vec<GeneratedQuestion> {
    let questions = match subject {
        "Physics" => vec![question(
            "What is the SI unit of force?",
            ["Newton", "Joule", "Watt", "Pascal"],
            "The SI unit of force is the Newton (N), defined as the force required to accelerate 1 kg at 1 m/s².",
        )],
        "Chemistry" => vec![question(
            "What is the chemical formula for water?",
            ["H2O", "CO2", "O2", "H2"],
            "Water has the chemical formula H2O, consisting of two hydrogen atoms and one oxygen atom.",
        )],
        _ => vec![question(
            "What is the fundamental theorem of arithmetic?",
            [
                "Every natural number can be expressed as a product of primes",
                "Every natural number is divisible by 2",
                "Every natural number is a prime number",
                "Every natural number is even",
            ],
            "The fundamental theorem of arithmetic states that every natural number greater than 1 can be expressed as a unique product of prime numbers.",
        )],
    };
    questions.into_iter().take(count).collect()
}

pub fn sample_content(subject: &str, chapter: &str, topic: Option<&str>) -> GeneratedContent {
    let title = format!("{chapter} - {}", topic.filter(|t| !t.is_empty()).unwrap_or("Introduction"));
    let content = match subject {
        "Physics" => format!(
            "# {chapter}\n\n## Introduction\nThis chapter explores fundamental principles of physics and their applications.\n\n\
             ## Key Concepts\n- **Concept 1**: Definition and explanation\n- **Concept 2**: Definition and explanation\n- **Concept 3**: Definition and explanation\n\n\
             ## Examples\n### Example 1\nProblem: [Sample problem]\nSolution: [Step-by-step solution]\n\n\
             ## Practice Problems\n1. [Practice problem 1]\n2. [Practice problem 2]\n\n\
             ## Summary\n- Key point 1\n- Key point 2\n"
        ),
        _ => format!(
            "# {chapter}\n\n## Introduction\nThis chapter covers fundamental concepts in mathematics that are essential for understanding advanced topics.\n\n\
             ## Key Concepts\n- **Concept 1**: Definition and explanation\n- **Concept 2**: Definition and explanation\n- **Concept 3**: Definition and explanation\n\n\
             ## Examples\n### Example 1\nProblem: [Sample problem]\nSolution: [Step-by-step solution]\n\n\
             ### Example 2\nProblem: [Sample problem]\nSolution: [Step-by-step solution]\n\n\
             ## Practice Problems\n1. [Practice problem 1]\n2. [Practice problem 2]\n3. [Practice problem 3]\n\n\
             ## Summary\n- Key point 1\n- Key point 2\n- Key point 3\n"
        ),
    };
    GeneratedContent { title, content, duration_minutes: 15 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_client;

    fn physics_plan(count: usize) -> QuizPlan<'static> {
        QuizPlan { subject: "Physics", chapter: "Laws of Motion", topic: None, difficulty: "medium", count }
    }

    fn completion(content: &str) -> String {
        serde_json::json!({ "choices": [{ "message": { "content": content } }] }).to_string()
    }

    #[test]
    fn extracts_json_from_fenced_reply() {
        let reply = "Sure! Here you go:\n```json\n[{\"a\": 1}]\n```\nGood luck!";
        assert_eq!(extract_json(reply), "[{\"a\": 1}]");
        assert_eq!(extract_json("no json here"), "no json here");
    }

    #[test]
    fn parses_questions_and_fills_explanations() {
        let reply = r#"[
            {"question": "Unit of force?", "options": ["Newton", "Joule", "Watt", "Pascal"], "correct_answer": 0},
            {"question": "Unit of work?", "options": ["Newton", "Joule", "Watt", "Pascal"], "correct_answer": "B", "explanation": "Work is energy."}
        ]"#;
        let qs = parse_quiz_questions(reply).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].explanation, "This is the correct answer for question 1");
        assert_eq!(qs[1].correct_answer, 1);
    }

    #[test]
    fn accepts_wrapped_question_object() {
        let reply = r#"{"questions": [{"question": "Q?", "options": ["a", "b"], "correct_answer": "b"}]}"#;
        let qs = parse_quiz_questions(reply).unwrap();
        assert_eq!(qs[0].correct_answer, 1);
    }

    #[test]
    fn rejects_malformed_questions() {
        assert!(matches!(parse_quiz_questions("not json"), Err(GenerateError::Json(_))));
        assert!(matches!(parse_quiz_questions("[]"), Err(GenerateError::Empty)));
        let out_of_range = r#"[{"question": "Q?", "options": ["a", "b"], "correct_answer": 5}]"#;
        assert!(matches!(
            parse_quiz_questions(out_of_range),
            Err(GenerateError::InvalidQuestion { index: 0, .. })
        ));
        let one_option = r#"[{"question": "Q?", "options": ["a"], "correct_answer": 0}]"#;
        assert!(parse_quiz_questions(one_option).is_err());
    }

    #[test]
    fn parses_study_content_with_default_duration() {
        let c = parse_study_content(r##"{"title": "Motion", "content": "# Motion"}"##).unwrap();
        assert_eq!(c.duration_minutes, 15);
        assert!(parse_study_content("plain text").is_err());
    }

    #[test]
    fn prompts_carry_context() {
        let ctx = SyllabusContext {
            topics: vec!["Inertia".into(), "Momentum".into()],
            learning_objectives: vec!["State Newton's laws".into()],
        };
        let plan = QuizPlan { topic: Some("Inertia"), ..physics_plan(3) };
        let prompt = quiz_prompt(&plan, &ctx);
        assert!(prompt.starts_with("Generate 3 multiple choice questions for Physics - Chapter: Laws of Motion, Topic: Inertia."));
        assert!(prompt.contains("Topics: Inertia, Momentum"));
        assert!(prompt.contains("Learning Objectives: State Newton's laws"));
        assert_eq!(SyllabusContext::default().render(), "");
    }

    #[test]
    fn samples_default_to_mathematics() {
        let qs = sample_questions("Kannada", 5);
        assert_eq!(qs.len(), 1);
        assert!(qs[0].question.contains("fundamental theorem of arithmetic"));
        assert!(sample_questions("Physics", 0).is_empty());
        let c = sample_content("Biology", "Life Processes", None);
        assert_eq!(c.title, "Life Processes - Introduction");
        assert!(c.content.contains("mathematics"));
    }

    #[tokio::test]
    async fn quiz_falls_back_when_llm_unreachable() {
        let llm = test_client("http://127.0.0.1:1", Some("k"));
        let (qs, source) = generate_quiz(&llm, &physics_plan(5), &SyllabusContext::default()).await;
        assert_eq!(source, Source::Fallback);
        assert_eq!(qs[0].options[0], "Newton");
    }

    #[tokio::test]
    async fn quiz_falls_back_on_malformed_reply() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion("I cannot produce JSON today."))
            .create_async()
            .await;
        let llm = test_client(&server.url(), Some("k"));
        let (qs, source) = generate_quiz(&llm, &physics_plan(5), &SyllabusContext::default()).await;
        assert_eq!(source, Source::Fallback);
        assert_eq!(qs.len(), 1);
    }

    #[tokio::test]
    async fn quiz_uses_llm_reply_and_truncates() {
        let questions = r#"```json
[{"question":"Q1?","options":["a","b","c","d"],"correct_answer":0,"explanation":"e"},
 {"question":"Q2?","options":["a","b","c","d"],"correct_answer":3,"explanation":"e"},
 {"question":"Q3?","options":["a","b","c","d"],"correct_answer":2,"explanation":"e"}]
```"#;
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion(questions))
            .create_async()
            .await;
        let llm = test_client(&server.url(), Some("k"));
        let (qs, source) = generate_quiz(&llm, &physics_plan(2), &SyllabusContext::default()).await;
        assert_eq!(source, Source::Llm);
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[1].correct_answer, 3);
    }

    #[tokio::test]
    async fn content_falls_back_without_api_key() {
        let llm = test_client("http://127.0.0.1:1", None);
        let plan = ContentPlan {
            subject: "Physics",
            chapter: "Gravitation",
            topic: Some("Free fall"),
            content_type: "text",
            difficulty: "medium",
        };
        let (content, source) = generate_content(&llm, &plan, &SyllabusContext::default()).await;
        assert_eq!(source, Source::Fallback);
        assert_eq!(content.title, "Gravitation - Free fall");
        assert!(content.content.starts_with("# Gravitation"));
    }
}
