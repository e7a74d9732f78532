//! Comment threads built from realistic answer lists.

use bulsho_shared::types::{Answer, AnswerRow, ChangeEvent};
use bulsho_sync::{build_forest, walk, CommentThread, ThreadNode};
use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

fn answers(question_id: Uuid, parents: &[Option<usize>]) -> Vec<Answer> {
    let ids: Vec<Uuid> = parents.iter().map(|_| Uuid::new_v4()).collect();
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    parents
        .iter()
        .enumerate()
        .map(|(i, parent)| Answer {
            id: ids[i],
            question_id,
            parent_id: parent.map(|p| ids.get(p).copied().unwrap_or_else(Uuid::new_v4)),
            author_id: Uuid::new_v4(),
            content: format!("jawaab {}", i),
            created_at: start + Duration::minutes(i as i64),
        })
        .collect()
}

fn total_nodes(forest: &[ThreadNode<Answer>]) -> usize {
    forest.iter().map(ThreadNode::size).sum()
}

#[test]
fn forest_contains_every_answer_once() {
    let question = Uuid::new_v4();
    // 99 points outside the list, so answer 4 is an orphan.
    let list = answers(
        question,
        &[None, Some(0), Some(0), Some(1), Some(99), Some(4), None, Some(6)],
    );

    let forest = build_forest(list.clone());

    assert_eq!(total_nodes(&forest), list.len());
    let roots: Vec<Uuid> = forest.iter().map(|node| node.item.id).collect();
    assert_eq!(roots, vec![list[0].id, list[4].id, list[6].id]);

    let order: Vec<Uuid> = walk(&forest).into_iter().map(|(_, a)| a.id).collect();
    let expected: Vec<Uuid> = [0, 1, 3, 2, 4, 5, 6, 7].iter().map(|&i| list[i].id).collect();
    assert_eq!(order, expected);
}

#[test]
fn forest_from_transport_rows() {
    let question = Uuid::new_v4().to_string();
    let root = Uuid::new_v4().to_string();
    let rows = vec![
        AnswerRow {
            id: root.clone(),
            question_id: question.clone(),
            parent_id: None,
            user_id: Uuid::new_v4().to_string(),
            content: "Su'aal fiican".to_string(),
            created_at: Utc::now(),
        },
        AnswerRow {
            id: Uuid::new_v4().to_string(),
            question_id: question.clone(),
            parent_id: Some(root.clone()),
            user_id: Uuid::new_v4().to_string(),
            content: "Waan ku raacsanahay".to_string(),
            created_at: Utc::now(),
        },
    ];

    let answers: Vec<Answer> = rows
        .into_iter()
        .map(Answer::try_from)
        .collect::<Result<_, _>>()
        .unwrap();
    let forest = build_forest(answers);

    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0].item.id.to_string(), root);
    assert_eq!(forest[0].children.len(), 1);
}

#[test]
fn deleted_parent_promotes_replies_and_keeps_drafts() {
    let question = Uuid::new_v4();
    let list = answers(question, &[None, Some(0), Some(1), None]);
    let mut thread = CommentThread::new(question, list.clone());
    assert!(thread.set_draft(list[2].id, "jawaab qabyo ah"));

    thread.apply_event(&ChangeEvent::AnswerDeleted { id: list[1].id });

    let roots: Vec<Uuid> = thread.forest().iter().map(|node| node.item.id).collect();
    assert_eq!(roots, vec![list[0].id, list[2].id, list[3].id]);
    assert_eq!(thread.draft(list[2].id), Some("jawaab qabyo ah"));
    assert_eq!(total_nodes(thread.forest()), 3);
}
