//! Conversion of raw Piazza post JSON into [`Post`] values.
//!
//! Piazza content is HTML; everything stored is plain text.

use crate::models::{Answer, AnswerAuthor, AuthorRole, Course, Followup, Post, Reply};
use scraper::Html;
use serde_json::Value;

/// Reduce an HTML fragment to whitespace-separated text.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn children(value: &Value) -> impl Iterator<Item = &Value> {
    value
        .get("children")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// The newest revision of a post or answer.
fn latest_revision(value: &Value) -> Option<&Value> {
    value
        .get("history")
        .and_then(Value::as_array)
        .and_then(|history| history.first())
}

fn author_role(raw: &Value) -> AuthorRole {
    if let Some(latest) = latest_revision(raw) {
        if str_field(latest, "anon") == "full" {
            return AuthorRole::Anonymous;
        }
    }
    if str_field(raw, "bucket_name") == "Instructors" {
        return AuthorRole::Instructor;
    }
    AuthorRole::Student
}

fn answers(raw: &Value) -> Vec<Answer> {
    children(raw)
        .filter_map(|child| {
            let author = match str_field(child, "type") {
                "i_answer" => AnswerAuthor::Instructor,
                "s_answer" => AnswerAuthor::Student,
                _ => return None,
            };
            let content = latest_revision(child)
                .map(|rev| str_field(rev, "content"))
                .unwrap_or("");
            Some(Answer {
                author,
                text: html_to_text(content),
                created_at: str_field(child, "created").to_string(),
                endorsements: child
                    .get("tag_endorse")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len),
            })
        })
        .collect()
}

fn followups(raw: &Value) -> Vec<Followup> {
    children(raw)
        .filter(|child| str_field(child, "type") == "followup")
        .map(|child| Followup {
            text: html_to_text(str_field(child, "subject")),
            created_at: str_field(child, "created").to_string(),
            replies: children(child)
                .filter(|reply| str_field(reply, "type") == "feedback")
                .map(|reply| Reply {
                    text: html_to_text(str_field(reply, "subject")),
                    created_at: str_field(reply, "created").to_string(),
                })
                .collect(),
        })
        .collect()
}

/// Parse the `result` of a `content.get` call.
pub fn parse_post(raw: &Value) -> Post {
    let latest = latest_revision(raw);
    let subject = latest.map(|rev| str_field(rev, "subject")).unwrap_or("");
    let content = latest.map(|rev| str_field(rev, "content")).unwrap_or("");

    Post {
        id: str_field(raw, "id").to_string(),
        nr: raw.get("nr").and_then(Value::as_u64).unwrap_or(0),
        title: html_to_text(subject),
        body: html_to_text(content),
        kind: str_field(raw, "type").to_string(),
        folders: string_list(raw, "folders"),
        tags: string_list(raw, "tags"),
        author_role: author_role(raw),
        answers: answers(raw),
        followups: followups(raw),
        resolved: raw.get("no_answer").and_then(Value::as_u64).unwrap_or(0) == 0,
        created_at: str_field(raw, "created").to_string(),
        unique_views: raw.get("unique_views").and_then(Value::as_u64).unwrap_or(0),
    }
}

/// Parse the `networks` list from a `user.status` result.
pub fn parse_courses(status: &Value) -> Vec<Course> {
    status
        .get("networks")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|network| {
            let id = network
                .get("id")
                .or_else(|| network.get("nid"))
                .and_then(Value::as_str)?;
            let name = match str_field(network, "name") {
                "" => "Unknown Course",
                name => name,
            };
            Some(Course {
                id: id.to_string(),
                name: name.to_string(),
                term: str_field(network, "term").to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_post() -> Value {
        json!({
            "id": "kx1",
            "nr": 42,
            "type": "question",
            "folders": ["pset2", "logistics"],
            "tags": ["student"],
            "created": "2025-02-01T10:00:00Z",
            "unique_views": 17,
            "no_answer": 0,
            "history": [
                {"subject": "Pset2 <b>problem 3</b>", "content": "<p>Gradient &amp; loss<br/>explode</p>", "anon": "no"},
                {"subject": "old title", "content": "old body"}
            ],
            "children": [
                {
                    "type": "i_answer",
                    "created": "2025-02-01T11:00:00Z",
                    "tag_endorse": [{"id": "u1"}, {"id": "u2"}],
                    "history": [{"content": "<p>Lower the learning rate.</p>"}]
                },
                {
                    "type": "s_answer",
                    "history": [{"content": "Check your init."}]
                },
                {
                    "type": "followup",
                    "subject": "<p>Still broken</p>",
                    "created": "2025-02-01T12:00:00Z",
                    "children": [
                        {"type": "feedback", "subject": "same here"},
                        {"type": "dupe", "subject": "ignored"}
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_html_to_text() {
        assert_eq!(html_to_text("<p>Hello <b>world</b></p>"), "Hello world");
        assert_eq!(html_to_text("a &lt; b"), "a < b");
        assert_eq!(html_to_text(""), "");
    }

    #[test]
    fn test_parse_post() {
        let post = parse_post(&raw_post());

        assert_eq!(post.id, "kx1");
        assert_eq!(post.nr, 42);
        assert_eq!(post.title, "Pset2 problem 3");
        assert_eq!(post.body, "Gradient & loss explode");
        assert_eq!(post.kind, "question");
        assert_eq!(post.folders, vec!["pset2", "logistics"]);
        assert_eq!(post.author_role, AuthorRole::Student);
        assert!(post.resolved);
        assert_eq!(post.unique_views, 17);

        assert_eq!(post.answers.len(), 2);
        assert_eq!(post.answers[0].author, AnswerAuthor::Instructor);
        assert_eq!(post.answers[0].text, "Lower the learning rate.");
        assert_eq!(post.answers[0].endorsements, 2);
        assert_eq!(post.answers[1].author, AnswerAuthor::Student);

        assert_eq!(post.followups.len(), 1);
        assert_eq!(post.followups[0].text, "Still broken");
        assert_eq!(post.followups[0].replies.len(), 1);
        assert_eq!(post.followups[0].replies[0].text, "same here");
    }

    #[test]
    fn test_unresolved_and_roles() {
        let mut raw = raw_post();
        raw["no_answer"] = json!(1);
        raw["history"][0]["anon"] = json!("full");
        let post = parse_post(&raw);
        assert!(!post.resolved);
        assert_eq!(post.author_role, AuthorRole::Anonymous);

        let instructor = parse_post(&json!({
            "id": "n1",
            "bucket_name": "Instructors",
            "history": [{"subject": "Announcement", "content": ""}]
        }));
        assert_eq!(instructor.author_role, AuthorRole::Instructor);
        assert!(instructor.answers.is_empty());
    }

    #[test]
    fn test_parse_courses() {
        let status = json!({
            "email": "me@example.edu",
            "networks": [
                {"id": "abc", "name": "6.S191", "term": "Spring 2025"},
                {"nid": "def", "name": ""},
                {"name": "no id"}
            ]
        });

        let courses = parse_courses(&status);
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].id, "abc");
        assert_eq!(courses[0].term, "Spring 2025");
        assert_eq!(courses[1].id, "def");
        assert_eq!(courses[1].name, "Unknown Course");
    }
}
