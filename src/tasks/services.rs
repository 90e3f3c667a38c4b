use std::cmp::Ordering;

use time::{macros::format_description, Date, OffsetDateTime, PrimitiveDateTime, Time};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
    tasks::{
        dto::{CreateTaskRequest, ListTasksQuery, TaskStatsResponse},
        repo_types::{DateStats, OrderUpdate, Task, TaskFilter, TaskPatch},
    },
};

/// Most tasks a single list call returns.
pub const LIST_CEILING: usize = 1000;

pub(crate) fn parse_date(raw: &str) -> Option<Date> {
    Date::parse(raw, format_description!("[year]-[month]-[day]")).ok()
}

pub(crate) fn parse_time(raw: &str) -> Option<Time> {
    Time::parse(raw, format_description!("[hour]:[minute]")).ok()
}

fn check_text(text: &str) -> AppResult<()> {
    if text.trim().is_empty() {
        return Err(AppError::BadRequest("Task text is required".into()));
    }
    Ok(())
}

fn check_date(date: &str) -> AppResult<()> {
    parse_date(date)
        .map(|_| ())
        .ok_or_else(|| AppError::BadRequest("Invalid date, expected YYYY-MM-DD".into()))
}

fn check_time(time: &str) -> AppResult<()> {
    parse_time(time)
        .map(|_| ())
        .ok_or_else(|| AppError::BadRequest("Invalid time, expected HH:MM".into()))
}

/// Listing order: date, then time with unset first, then `order`, then creation.
pub(crate) fn listing_order(a: &Task, b: &Task) -> Ordering {
    a.date
        .cmp(&b.date)
        .then_with(|| a.time.cmp(&b.time))
        .then_with(|| a.order.cmp(&b.order))
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// `completed / total * 100` to one decimal, ties to even; zero for an empty set.
pub fn completion_rate(completed: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = completed as f64 / total as f64 * 100.0;
    (pct * 10.0).round_ties_even() / 10.0
}

pub fn summarize(by_date: Vec<DateStats>) -> TaskStatsResponse {
    let total: i64 = by_date.iter().map(|d| d.total).sum();
    let completed: i64 = by_date.iter().map(|d| d.completed).sum();
    TaskStatsResponse {
        by_date,
        total,
        completed,
        pending: total - completed,
        completion_rate: completion_rate(completed, total),
    }
}

/// Instant the reminder should fire, with `date` and `time` read as UTC.
pub fn reminder_fire_at(task: &Task) -> Option<OffsetDateTime> {
    let lead = task.reminder?.lead()?;
    let date = parse_date(&task.date)?;
    let time = parse_time(task.time.as_deref()?)?;
    Some(PrimitiveDateTime::new(date, time).assume_utc() - lead)
}

pub async fn create_task(st: &AppState, owner: &str, req: CreateTaskRequest) -> AppResult<Task> {
    check_text(&req.text)?;
    check_date(&req.date)?;
    if let Some(time) = &req.time {
        check_time(time)?;
    }

    let task = Task {
        id: Uuid::new_v4().to_string(),
        user_id: owner.to_owned(),
        text: req.text,
        completed: false,
        priority: req.priority,
        date: req.date,
        time: req.time,
        reminder: req.reminder,
        reminder_sent: false,
        audio_base64: req.audio_base64,
        created_at: OffsetDateTime::now_utc(),
        order: req.order.unwrap_or(0),
    };
    st.tasks.insert(&task).await?;
    info!(task_id = %task.id, "task created");
    Ok(task)
}

fn filter_from_query(q: ListTasksQuery) -> AppResult<TaskFilter> {
    let date = q.date.filter(|d| !d.is_empty());
    let priority = match q.priority.as_deref() {
        None | Some("") => None,
        Some(p) => Some(
            p.parse()
                .map_err(|_| AppError::BadRequest(format!("Invalid priority: {p}")))?,
        ),
    };
    Ok(TaskFilter { date, priority })
}

/// Returns the tasks and whether more than [`LIST_CEILING`] matched.
pub async fn list_tasks(
    st: &AppState,
    owner: &str,
    query: ListTasksQuery,
) -> AppResult<(Vec<Task>, bool)> {
    let filter = filter_from_query(query)?;
    let mut tasks = st
        .tasks
        .list(owner, &filter, LIST_CEILING as i64 + 1)
        .await?;
    let truncated = tasks.len() > LIST_CEILING;
    if truncated {
        tasks.truncate(LIST_CEILING);
        debug!(owner, "task list truncated");
    }
    Ok((tasks, truncated))
}

pub async fn get_task(st: &AppState, owner: &str, id: &str) -> AppResult<Task> {
    st.tasks
        .get(owner, id)
        .await?
        .ok_or_else(AppError::task_not_found)
}

pub async fn update_task(st: &AppState, owner: &str, id: &str, patch: TaskPatch) -> AppResult<Task> {
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update".into()));
    }
    if let Some(text) = &patch.text {
        check_text(text)?;
    }
    if let Some(date) = &patch.date {
        check_date(date)?;
    }
    if let Some(Some(time)) = &patch.time {
        check_time(time)?;
    }

    let task = st
        .tasks
        .update(owner, id, &patch)
        .await?
        .ok_or_else(AppError::task_not_found)?;
    info!(task_id = %task.id, "task updated");
    Ok(task)
}

pub async fn delete_task(st: &AppState, owner: &str, id: &str) -> AppResult<()> {
    if !st.tasks.delete(owner, id).await? {
        return Err(AppError::task_not_found());
    }
    info!(task_id = %id, "task deleted");
    Ok(())
}

pub async fn delete_tasks_by_date(st: &AppState, owner: &str, date: &str) -> AppResult<u64> {
    let count = st.tasks.delete_by_date(owner, date).await?;
    info!(date, count, "tasks deleted by date");
    Ok(count)
}

pub async fn task_stats(st: &AppState, owner: &str) -> AppResult<TaskStatsResponse> {
    Ok(summarize(st.tasks.stats_by_date(owner).await?))
}

pub async fn reorder_tasks(st: &AppState, owner: &str, updates: Vec<OrderUpdate>) -> AppResult<u64> {
    if updates.is_empty() {
        return Err(AppError::BadRequest("No tasks to reorder".into()));
    }
    let updated = st.tasks.reorder(owner, &updates).await?;
    info!(requested = updates.len(), updated, "tasks reordered");
    Ok(updated)
}

/// Due reminders at `now`, earliest first.
pub async fn pending_reminders(st: &AppState, owner: &str, now: OffsetDateTime) -> AppResult<Vec<Task>> {
    let mut due: Vec<(OffsetDateTime, Task)> = st
        .tasks
        .reminder_candidates(owner)
        .await?
        .into_iter()
        .filter_map(|t| reminder_fire_at(&t).map(|at| (at, t)))
        .filter(|(at, _)| *at <= now)
        .collect();
    due.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(due.into_iter().map(|(_, t)| t).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::repo_types::{Priority, Reminder};
    use time::macros::datetime;

    fn create_req(text: &str, date: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            text: text.into(),
            priority: Priority::Medium,
            date: date.into(),
            time: None,
            reminder: None,
            audio_base64: None,
            order: None,
        }
    }

    #[test]
    fn completion_rate_rounds_to_one_decimal() {
        assert_eq!(completion_rate(0, 0), 0.0);
        assert_eq!(completion_rate(1, 3), 33.3);
        assert_eq!(completion_rate(2, 3), 66.7);
        assert_eq!(completion_rate(3, 3), 100.0);
        assert_eq!(completion_rate(1, 8), 12.5);
        assert_eq!(completion_rate(1, 16), 6.2);
        assert_eq!(completion_rate(5, 16), 31.2);
        assert_eq!(completion_rate(3, 16), 18.8);
    }

    #[test]
    fn summarize_sums_dates() {
        let stats = summarize(vec![
            DateStats { date: "2025-01-01".into(), total: 2, completed: 1, high_priority: 1 },
            DateStats { date: "2025-01-02".into(), total: 1, completed: 0, high_priority: 0 },
        ]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.completion_rate, 33.3);

        let empty = summarize(vec![]);
        assert_eq!(empty.total, 0);
        assert_eq!(empty.completion_rate, 0.0);
    }

    #[test]
    fn date_and_time_formats() {
        assert!(parse_date("2025-01-31").is_some());
        assert!(parse_date("2025-02-30").is_none());
        assert!(parse_date("01/02/2025").is_none());
        assert!(parse_time("09:05").is_some());
        assert!(parse_time("23:59").is_some());
        assert!(parse_time("24:00").is_none());
        assert!(parse_time("9:05").is_none());
    }

    #[tokio::test]
    async fn create_applies_defaults_and_validates() {
        let st = AppState::fake();
        let task = create_task(&st, "u1", create_req("t1", "2025-01-01")).await.unwrap();
        assert!(!task.completed);
        assert_eq!(task.order, 0);
        assert_eq!(task.priority, Priority::Medium);

        for bad in [create_req("  ", "2025-01-01"), create_req("x", "2025-13-01")] {
            assert!(matches!(
                create_task(&st, "u1", bad).await.unwrap_err(),
                AppError::BadRequest(_)
            ));
        }
        let mut bad_time = create_req("x", "2025-01-01");
        bad_time.time = Some("noon".into());
        assert!(create_task(&st, "u1", bad_time).await.is_err());
    }

    #[tokio::test]
    async fn other_owner_sees_not_found() {
        let st = AppState::fake();
        let task = create_task(&st, "alice", create_req("mine", "2025-01-01")).await.unwrap();

        assert!(matches!(
            get_task(&st, "bob", &task.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        let patch = TaskPatch { completed: Some(true), ..Default::default() };
        assert!(matches!(
            update_task(&st, "bob", &task.id, patch).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            delete_task(&st, "bob", &task.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert_eq!(delete_tasks_by_date(&st, "bob", "2025-01-01").await.unwrap(), 0);

        let (listed, _) = list_tasks(&st, "bob", ListTasksQuery::default()).await.unwrap();
        assert!(listed.is_empty());
        assert!(!get_task(&st, "alice", &task.id).await.unwrap().completed);
    }

    #[tokio::test]
    async fn update_merges_only_present_fields() {
        let st = AppState::fake();
        let mut req = create_req("t1", "2025-01-01");
        req.time = Some("10:00".into());
        req.reminder = Some(Reminder::FifteenMinutes);
        let task = create_task(&st, "u1", req).await.unwrap();

        let empty = update_task(&st, "u1", &task.id, TaskPatch::default()).await;
        assert!(matches!(empty.unwrap_err(), AppError::BadRequest(_)));

        let patch: TaskPatch = serde_json::from_str(r#"{"completed": true, "time": null}"#).unwrap();
        let updated = update_task(&st, "u1", &task.id, patch).await.unwrap();
        assert!(updated.completed);
        assert_eq!(updated.text, "t1");
        assert_eq!(updated.time, None);
        assert_eq!(updated.reminder, Some(Reminder::FifteenMinutes));
    }

    #[tokio::test]
    async fn list_filters_and_orders() {
        let st = AppState::fake();
        let mut later = create_req("later", "2025-01-01");
        later.order = Some(1);
        create_task(&st, "u1", later).await.unwrap();
        create_task(&st, "u1", create_req("first", "2025-01-01")).await.unwrap();
        let mut timed = create_req("timed", "2025-01-01");
        timed.time = Some("08:00".into());
        create_task(&st, "u1", timed).await.unwrap();
        let mut high = create_req("other day", "2025-01-02");
        high.priority = Priority::High;
        create_task(&st, "u1", high).await.unwrap();

        let query = ListTasksQuery { date: Some("2025-01-01".into()), priority: None };
        let (tasks, truncated) = list_tasks(&st, "u1", query).await.unwrap();
        assert!(!truncated);
        let texts: Vec<_> = tasks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["first", "later", "timed"]);

        let query = ListTasksQuery { date: Some(String::new()), priority: Some("high".into()) };
        let (tasks, _) = list_tasks(&st, "u1", query).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "other day");

        let query = ListTasksQuery { date: None, priority: Some("urgent".into()) };
        assert!(list_tasks(&st, "u1", query).await.is_err());
    }

    #[tokio::test]
    async fn list_signals_truncation() {
        let st = AppState::fake();
        for i in 0..=LIST_CEILING {
            let mut req = create_req("bulk", "2025-03-01");
            req.order = Some(i as i32);
            create_task(&st, "u1", req).await.unwrap();
        }
        let (tasks, truncated) = list_tasks(&st, "u1", ListTasksQuery::default()).await.unwrap();
        assert!(truncated);
        assert_eq!(tasks.len(), LIST_CEILING);
    }

    #[tokio::test]
    async fn stats_are_owner_scoped() {
        let st = AppState::fake();
        let mut high = create_req("a", "2025-01-02");
        high.priority = Priority::High;
        let a = create_task(&st, "u1", high).await.unwrap();
        create_task(&st, "u1", create_req("b", "2025-01-01")).await.unwrap();
        create_task(&st, "u1", create_req("c", "2025-01-01")).await.unwrap();
        create_task(&st, "u2", create_req("noise", "2025-01-01")).await.unwrap();
        let done = TaskPatch { completed: Some(true), ..Default::default() };
        update_task(&st, "u1", &a.id, done).await.unwrap();

        let stats = task_stats(&st, "u1").await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.completion_rate, 33.3);
        assert_eq!(
            stats.by_date,
            vec![
                DateStats { date: "2025-01-01".into(), total: 2, completed: 0, high_priority: 0 },
                DateStats { date: "2025-01-02".into(), total: 1, completed: 1, high_priority: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn reorder_skips_foreign_tasks() {
        let st = AppState::fake();
        let mine = create_task(&st, "u1", create_req("mine", "2025-01-01")).await.unwrap();
        let theirs = create_task(&st, "u2", create_req("theirs", "2025-01-01")).await.unwrap();

        let updated = reorder_tasks(
            &st,
            "u1",
            vec![
                OrderUpdate { id: mine.id.clone(), order: 5 },
                OrderUpdate { id: theirs.id.clone(), order: 9 },
            ],
        )
        .await
        .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(get_task(&st, "u1", &mine.id).await.unwrap().order, 5);
        assert_eq!(get_task(&st, "u2", &theirs.id).await.unwrap().order, 0);
        assert!(reorder_tasks(&st, "u1", vec![]).await.is_err());
    }

    #[test]
    fn fire_instant_subtracts_lead() {
        let mut task = Task {
            id: "t".into(),
            user_id: "u".into(),
            text: "call".into(),
            completed: false,
            priority: Priority::Low,
            date: "2025-06-01".into(),
            time: Some("10:00".into()),
            reminder: Some(Reminder::ThirtyMinutes),
            reminder_sent: false,
            audio_base64: None,
            created_at: OffsetDateTime::now_utc(),
            order: 0,
        };
        assert_eq!(reminder_fire_at(&task), Some(datetime!(2025-06-01 09:30 UTC)));

        task.reminder = Some(Reminder::AtTime);
        assert_eq!(reminder_fire_at(&task), Some(datetime!(2025-06-01 10:00 UTC)));

        task.reminder = Some(Reminder::None);
        assert_eq!(reminder_fire_at(&task), None);

        task.reminder = Some(Reminder::OneHour);
        task.time = None;
        assert_eq!(reminder_fire_at(&task), None);
    }

    #[tokio::test]
    async fn pending_reminders_respect_state_and_clock() {
        let st = AppState::fake();
        let now = datetime!(2025-06-01 09:50 UTC);

        let mut due = create_req("due", "2025-06-01");
        due.time = Some("10:00".into());
        due.reminder = Some(Reminder::FifteenMinutes);
        let due = create_task(&st, "u1", due).await.unwrap();

        let mut early = create_req("not yet", "2025-06-01");
        early.time = Some("11:00".into());
        early.reminder = Some(Reminder::FifteenMinutes);
        create_task(&st, "u1", early).await.unwrap();

        let mut off = create_req("off", "2025-06-01");
        off.time = Some("09:00".into());
        off.reminder = Some(Reminder::None);
        create_task(&st, "u1", off).await.unwrap();

        let mut done = create_req("done", "2025-06-01");
        done.time = Some("09:00".into());
        done.reminder = Some(Reminder::AtTime);
        let done = create_task(&st, "u1", done).await.unwrap();
        let patch = TaskPatch { completed: Some(true), ..Default::default() };
        update_task(&st, "u1", &done.id, patch).await.unwrap();

        let pending = pending_reminders(&st, "u1", now).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, due.id);

        let ack = TaskPatch { reminder_sent: Some(true), ..Default::default() };
        update_task(&st, "u1", &due.id, ack).await.unwrap();
        assert!(pending_reminders(&st, "u1", now).await.unwrap().is_empty());
        assert!(pending_reminders(&st, "u2", now).await.unwrap().is_empty());
    }
}
