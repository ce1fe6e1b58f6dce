use std::collections::BTreeMap;

use sqlx::{types::Json, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    db::Db,
    generate::SyllabusContext,
    models::{BulkSyllabusReq, SyllabusEntry},
};

/// class -> subject -> chapters
pub type Grouped = BTreeMap<String, BTreeMap<String, Vec<SyllabusEntry>>>;

/// Nests rows by class then subject. Chapters keep the order they arrived in.
pub fn group_by_class_subject(rows: Vec<SyllabusEntry>) -> Grouped {
    let mut grouped = Grouped::new();
    for row in rows {
        grouped
            .entry(row.class.clone())
            .or_default()
            .entry(row.subject.clone())
            .or_default()
            .push(row);
    }
    grouped
}

/// Topics and objectives of the named chapter, empty when it is unknown.
pub async fn load_context(db: &Db, subject: &str, chapter: &str) -> Result<SyllabusContext, sqlx::Error> {
    let row: Option<(Json<Vec<String>>, Json<Vec<String>>)> = sqlx::query_as(
        "SELECT topics, learning_objectives FROM syllabus WHERE subject = $1 AND chapter_name = $2 LIMIT 1",
    )
    .bind(subject)
    .bind(chapter)
    .fetch_optional(db)
    .await?;

    Ok(row
        .map(|(Json(topics), Json(learning_objectives))| SyllabusContext { topics, learning_objectives })
        .unwrap_or_default())
}

/// Drops every chapter of `req.class` and inserts the uploaded ones.
/// Returns how many rows were removed.
pub async fn replace_class(tx: &mut Transaction<'_, Postgres>, req: &BulkSyllabusReq) -> Result<u64, sqlx::Error> {
    let removed = sqlx::query("DELETE FROM syllabus WHERE class = $1")
        .bind(&req.class)
        .execute(&mut **tx)
        .await?
        .rows_affected();

    for subject in &req.subjects {
        for chapter in &subject.chapters {
            sqlx::query(
                "INSERT INTO syllabus (id, class, subject, chapter_name, chapter_number, topics, \
                 learning_objectives, duration_hours, difficulty_level, prerequisites, tags, is_active) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, true)",
            )
            .bind(Uuid::new_v4())
            .bind(&req.class)
            .bind(&subject.name)
            .bind(&chapter.name)
            .bind(chapter.number)
            .bind(Json(&chapter.topics))
            .bind(Json(&chapter.learning_objectives))
            .bind(chapter.duration_hours)
            .bind(chapter.difficulty_level.as_str())
            .bind(Json(&chapter.prerequisites))
            .bind(Json(&chapter.tags))
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BulkChapter, BulkSubject};
    use chrono::Utc;

    fn entry(class: &str, subject: &str, chapter: &str, number: i32) -> SyllabusEntry {
        let now = Utc::now();
        SyllabusEntry {
            id: Uuid::new_v4(),
            class: class.into(),
            subject: subject.into(),
            chapter_name: chapter.into(),
            chapter_number: number,
            topics: Json(vec![]),
            learning_objectives: Json(vec![]),
            duration_hours: 10,
            difficulty_level: "intermediate".into(),
            prerequisites: Json(vec![]),
            tags: Json(vec![]),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn nests_class_then_subject() {
        let grouped = group_by_class_subject(vec![
            entry("SSLC", "Mathematics", "Real Numbers", 1),
            entry("SSLC", "Mathematics", "Polynomials", 2),
            entry("SSLC", "Science", "Chemical Reactions", 1),
            entry("1st PUC", "Physics", "Units and Measurement", 1),
        ]);
        assert_eq!(grouped.keys().collect::<Vec<_>>(), ["1st PUC", "SSLC"]);
        let sslc = &grouped["SSLC"];
        assert_eq!(sslc.keys().collect::<Vec<_>>(), ["Mathematics", "Science"]);
        let maths: Vec<_> = sslc["Mathematics"].iter().map(|c| c.chapter_name.as_str()).collect();
        assert_eq!(maths, ["Real Numbers", "Polynomials"]);
    }

    #[test]
    fn keeps_incoming_chapter_order() {
        let grouped = group_by_class_subject(vec![
            entry("SSLC", "Mathematics", "Polynomials", 2),
            entry("SSLC", "Mathematics", "Real Numbers", 1),
        ]);
        let numbers: Vec<_> = grouped["SSLC"]["Mathematics"].iter().map(|c| c.chapter_number).collect();
        assert_eq!(numbers, [2, 1]);
    }

    #[test]
    fn empty_input_groups_to_nothing() {
        assert!(group_by_class_subject(vec![]).is_empty());
    }

    #[test]
    fn grouped_output_serializes_as_nested_objects() {
        let grouped = group_by_class_subject(vec![entry("SSLC", "Mathematics", "Real Numbers", 1)]);
        let json = serde_json::to_value(&grouped).unwrap();
        assert_eq!(json["SSLC"]["Mathematics"][0]["chapter_name"], "Real Numbers");
        assert!(json["SSLC"]["Mathematics"][0]["topics"].is_array());
    }

    fn upload(class: &str, chapters: &[(&str, i32)]) -> BulkSyllabusReq {
        BulkSyllabusReq {
            class: class.into(),
            subjects: vec![BulkSubject {
                name: "Mathematics".into(),
                chapters: chapters
                    .iter()
                    .map(|(name, number)| BulkChapter {
                        name: (*name).into(),
                        number: *number,
                        topics: vec!["Basics".into()],
                        learning_objectives: vec![],
                        duration_hours: 10,
                        difficulty_level: Default::default(),
                        prerequisites: vec![],
                        tags: vec![],
                    })
                    .collect(),
            }],
        }
    }

    #[tokio::test]
    async fn upload_replaces_previous_chapters_of_the_class() {
        let Some(db) = crate::db::test_pool().await else { return };
        let class = format!("class-{}", Uuid::new_v4().simple());

        let mut tx = db.begin().await.unwrap();
        let first = upload(&class, &[("Real Numbers", 1), ("Polynomials", 2), ("Circles", 3)]);
        assert_eq!(replace_class(&mut tx, &first).await.unwrap(), 0);
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let second = upload(&class, &[("Triangles", 1), ("Statistics", 2)]);
        assert_eq!(replace_class(&mut tx, &second).await.unwrap(), 3);
        tx.commit().await.unwrap();

        let names: Vec<String> =
            sqlx::query_scalar("SELECT chapter_name FROM syllabus WHERE class = $1 ORDER BY chapter_number")
                .bind(&class)
                .fetch_all(&db)
                .await
                .unwrap();
        assert_eq!(names, ["Triangles", "Statistics"]);

        sqlx::query("DELETE FROM syllabus WHERE class = $1").bind(&class).execute(&db).await.unwrap();
    }
}
