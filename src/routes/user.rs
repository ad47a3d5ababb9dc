use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Form, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use crate::{
    auth::{AuthenticatedUser, CurrentUser},
    error::AppError,
    itinerary,
    models::{
        day::{Activity, ItineraryDay},
        trip::Trip,
    },
    state::AppState,
    stats,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/trips", post(trip_create))
        .route("/trips/:id", get(trip_detail))
        .route("/trips/:id/edit", get(trip_edit_form).post(trip_edit_submit))
        .route("/trips/:id/delete", post(trip_delete))
        .route("/trips/:id/days", post(day_create))
        .route("/trips/:id/days/reorder", post(days_reorder))
        .route("/trips/:id/days/:day_id/edit", post(day_edit))
        .route("/trips/:id/days/:day_id/delete", post(day_delete))
        .route("/trips/:id/days/:day_id/activities", post(activity_create))
        .route(
            "/trips/:id/days/:day_id/activities/:activity_id/edit",
            post(activity_edit),
        )
        .route(
            "/trips/:id/days/:day_id/activities/:activity_id/delete",
            post(activity_delete),
        )
        .route("/trips/:id/activities/move", post(activity_move))
        .route("/trips/:id/budget", get(budget_page))
}

/// Loads a trip and checks that the signed-in user owns it. Trips are
/// owned exclusively by their creator; everyone else gets 403.
async fn load_owned_trip(
    state: &AppState,
    user: &AuthenticatedUser,
    trip_id: &str,
) -> Result<Trip, AppError> {
    let trip = state.store.load_trip(trip_id).await?;
    if trip.owner_uuid != user.uuid {
        return Err(AppError::Forbidden);
    }
    Ok(trip)
}

fn trip_url(trip_id: &str) -> String {
    format!("/me/trips/{trip_id}")
}

#[derive(Clone)]
struct TripSummary {
    id: String,
    name: String,
    date_range: String,
    is_public: bool,
}

#[derive(Template)]
#[template(path = "user/dashboard.html")]
struct DashboardTemplate {
    display_name: String,
    trips: Vec<TripSummary>,
}

async fn dashboard(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trips = state.store.list_trips_for(&user.uuid).await?;
    let summaries = trips
        .into_iter()
        .map(|trip| TripSummary {
            id: trip.id.clone(),
            name: trip.name.clone(),
            date_range: trip.date_range_display(),
            is_public: trip.is_public,
        })
        .collect();
    Ok(AskamaTemplateResponse::into_response(DashboardTemplate {
        display_name: user.username.clone(),
        trips: summaries,
    }))
}

#[derive(Deserialize)]
struct TripForm {
    name: String,
    description: Option<String>,
    start_date: String,
    end_date: String,
    budget: Option<String>,
    is_public: Option<String>,
}

async fn trip_create(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<TripForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let name = form.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(
            "Die Reise braucht einen Namen.".into(),
        ));
    }
    let (start_date, end_date) = parse_date_range(&form.start_date, &form.end_date)?;

    let mut trip = Trip::new(&user.uuid, name, start_date, end_date);
    trip.description = normalize_optional(form.description);
    trip.budget = parse_amount(form.budget)?;
    trip.is_public = form.is_public.is_some();

    state.store.save_trip(&trip).await?;
    info!(trip_id = %trip.id, owner = %user.username, "trip created");
    Ok(Redirect::to(&trip_url(&trip.id)))
}

#[derive(Clone)]
struct ActivityRow {
    id: String,
    index: usize,
    name: String,
    location: String,
    time: String,
    cost: String,
    category: String,
}

#[derive(Clone)]
struct DayCard {
    id: String,
    index: usize,
    title: String,
    date: String,
    description: String,
    activities: Vec<ActivityRow>,
}

#[derive(Template)]
#[template(path = "user/trip_detail.html")]
struct TripDetailTemplate {
    trip_id: String,
    name: String,
    description: String,
    date_range: String,
    is_public: bool,
    days: Vec<DayCard>,
    day_count: usize,
    activity_count: usize,
    total_cost: String,
}

async fn trip_detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = load_owned_trip(&state, user, &trip_id).await?;
    let days = state.store.load_days(&trip.id).await?;

    let day_cards: Vec<DayCard> = days
        .iter()
        .enumerate()
        .map(|(day_index, day)| DayCard {
            id: day.id.clone(),
            index: day_index,
            title: day.title.clone(),
            date: day.date_display(),
            description: day.description_display().to_string(),
            activities: day
                .activities
                .iter()
                .enumerate()
                .map(|(activity_index, activity)| ActivityRow {
                    id: activity.id.clone(),
                    index: activity_index,
                    name: activity.name.clone(),
                    location: activity.location_display().to_string(),
                    time: activity.time_display(),
                    cost: format!("{:.2}", activity.cost_or_zero()),
                    category: activity
                        .category
                        .clone()
                        .unwrap_or_else(|| stats::DEFAULT_CATEGORY.into()),
                })
                .collect(),
        })
        .collect();

    Ok(AskamaTemplateResponse::into_response(TripDetailTemplate {
        trip_id: trip.id.clone(),
        name: trip.name.clone(),
        description: trip.description_display().to_string(),
        date_range: trip.date_range_display(),
        is_public: trip.is_public,
        day_count: day_cards.len(),
        activity_count: stats::trip_activity_count(&days),
        total_cost: format!("{:.2}", stats::trip_total_cost(&days)),
        days: day_cards,
    }))
}

#[derive(Template)]
#[template(path = "user/trip_edit.html")]
struct TripEditTemplate {
    trip_id: String,
    name: String,
    description: String,
    start_date: String,
    end_date: String,
    budget: String,
    is_public: bool,
}

async fn trip_edit_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = load_owned_trip(&state, user, &trip_id).await?;
    Ok(AskamaTemplateResponse::into_response(TripEditTemplate {
        trip_id: trip.id.clone(),
        name: trip.name.clone(),
        description: trip.description_display().to_string(),
        start_date: trip.start_date.format("%Y-%m-%d").to_string(),
        end_date: trip.end_date.format("%Y-%m-%d").to_string(),
        budget: trip
            .budget
            .map(|b| format!("{b:.2}"))
            .unwrap_or_default(),
        is_public: trip.is_public,
    }))
}

async fn trip_edit_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Form(form): Form<TripForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let mut trip = load_owned_trip(&state, user, &trip_id).await?;

    let name = form.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(
            "Die Reise braucht einen Namen.".into(),
        ));
    }
    let (start_date, end_date) = parse_date_range(&form.start_date, &form.end_date)?;

    trip.name = name.to_string();
    trip.description = normalize_optional(form.description);
    trip.start_date = start_date;
    trip.end_date = end_date;
    trip.budget = parse_amount(form.budget)?;
    trip.is_public = form.is_public.is_some();

    state.store.save_trip(&trip).await?;
    Ok(Redirect::to(&trip_url(&trip.id)))
}

async fn trip_delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    load_owned_trip(&state, user, &trip_id).await?;
    state.store.delete_trip(&trip_id).await?;
    info!(trip_id = %trip_id, "trip deleted");
    Ok(Redirect::to("/me"))
}

#[derive(Deserialize)]
struct DayForm {
    title: String,
    date: String,
    description: Option<String>,
}

async fn day_create(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Form(form): Form<DayForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let trip = load_owned_trip(&state, user, &trip_id).await?;
    let days = state.store.load_days(&trip.id).await?;

    // New days append; the order rank is the current day count.
    let mut day = ItineraryDay::new(
        &trip.id,
        parse_date(&form.date)?,
        form.title.trim(),
        days.len() as i64,
    );
    day.description = normalize_optional(form.description);
    state.store.save_day(&day).await?;
    Ok(Redirect::to(&trip_url(&trip.id)))
}

async fn day_edit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, day_id)): Path<(String, String)>,
    Form(form): Form<DayForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let trip = load_owned_trip(&state, user, &trip_id).await?;
    let mut day = find_day(&state, &trip.id, &day_id).await?;

    day.title = form.title.trim().to_string();
    day.date = parse_date(&form.date)?;
    day.description = normalize_optional(form.description);
    state.store.save_day(&day).await?;
    Ok(Redirect::to(&trip_url(&trip.id)))
}

async fn day_delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, day_id)): Path<(String, String)>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let trip = load_owned_trip(&state, user, &trip_id).await?;
    state.store.delete_day(&trip.id, &day_id).await?;

    // Keep the order ranking dense across the survivors.
    let mut days = state.store.load_days(&trip.id).await?;
    for (position, day) in days.iter_mut().enumerate() {
        day.order = position as i64;
    }
    state.store.save_days(&trip.id, &days).await?;
    Ok(Redirect::to(&trip_url(&trip.id)))
}

#[derive(Deserialize)]
struct ReorderForm {
    source_index: usize,
    dest_index: usize,
}

async fn days_reorder(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Form(form): Form<ReorderForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let trip = load_owned_trip(&state, user, &trip_id).await?;
    let days = state.store.load_days(&trip.id).await?;

    let days = itinerary::move_day(days, form.source_index, form.dest_index)?;
    state.store.save_days(&trip.id, &days).await?;
    info!(
        trip_id = %trip.id,
        from = form.source_index,
        to = form.dest_index,
        "days reordered"
    );
    Ok(Redirect::to(&trip_url(&trip.id)))
}

#[derive(Deserialize)]
struct ActivityForm {
    name: String,
    description: Option<String>,
    location: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    cost: Option<String>,
    category: Option<String>,
}

async fn activity_create(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, day_id)): Path<(String, String)>,
    Form(form): Form<ActivityForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let trip = load_owned_trip(&state, user, &trip_id).await?;
    let mut day = find_day(&state, &trip.id, &day_id).await?;

    let name = form.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(
            "Die Aktivität braucht einen Namen.".into(),
        ));
    }
    let mut activity = Activity::new(name);
    apply_activity_form(&mut activity, form)?;

    // Activities carry no rank field; the day document's vector is the
    // order, so any change is a whole-vector replacement.
    day.activities.push(activity);
    state.store.save_day(&day).await?;
    Ok(Redirect::to(&trip_url(&trip.id)))
}

async fn activity_edit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, day_id, activity_id)): Path<(String, String, String)>,
    Form(form): Form<ActivityForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let trip = load_owned_trip(&state, user, &trip_id).await?;
    let mut day = find_day(&state, &trip.id, &day_id).await?;

    let activity = day
        .activities
        .iter_mut()
        .find(|a| a.id == activity_id)
        .ok_or(AppError::NotFound)?;
    let name = form.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(
            "Die Aktivität braucht einen Namen.".into(),
        ));
    }
    activity.name = name.to_string();
    apply_activity_form(activity, form)?;

    state.store.save_day(&day).await?;
    Ok(Redirect::to(&trip_url(&trip.id)))
}

async fn activity_delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, day_id, activity_id)): Path<(String, String, String)>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let trip = load_owned_trip(&state, user, &trip_id).await?;
    let mut day = find_day(&state, &trip.id, &day_id).await?;

    let before = day.activities.len();
    day.activities.retain(|a| a.id != activity_id);
    if day.activities.len() == before {
        return Err(AppError::NotFound);
    }
    state.store.save_day(&day).await?;
    Ok(Redirect::to(&trip_url(&trip.id)))
}

#[derive(Deserialize)]
struct ActivityMoveForm {
    source_day_id: String,
    dest_day_id: String,
    source_index: usize,
    dest_index: usize,
}

/// Repositions one activity, within a day or across two days. The
/// cross-day variant persists two day documents with no transaction
/// around them; a failure surfaces here instead of being swallowed.
async fn activity_move(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Form(form): Form<ActivityMoveForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let trip = load_owned_trip(&state, user, &trip_id).await?;
    let same_day = form.source_day_id == form.dest_day_id;

    if same_day {
        let mut day = find_day(&state, &trip.id, &form.source_day_id).await?;
        let (activities, _) = itinerary::move_activity(
            day.activities,
            Vec::new(),
            form.source_index,
            form.dest_index,
            true,
        )?;
        day.activities = activities;
        state.store.save_day(&day).await?;
    } else {
        let mut source_day = find_day(&state, &trip.id, &form.source_day_id).await?;
        let mut dest_day = find_day(&state, &trip.id, &form.dest_day_id).await?;
        let (source_activities, dest_activities) = itinerary::move_activity(
            source_day.activities,
            dest_day.activities,
            form.source_index,
            form.dest_index,
            false,
        )?;
        source_day.activities = source_activities;
        dest_day.activities = dest_activities;
        state
            .store
            .save_activity_move(&trip.id, &source_day, &dest_day)
            .await?;
    }

    info!(
        trip_id = %trip.id,
        same_day,
        from = form.source_index,
        to = form.dest_index,
        "activity moved"
    );
    Ok(Redirect::to(&trip_url(&trip.id)))
}

#[derive(Clone)]
struct CategoryRow {
    name: String,
    count: usize,
}

#[derive(Template)]
#[template(path = "user/budget.html")]
struct BudgetTemplate {
    trip_id: String,
    name: String,
    has_budget: bool,
    budget: String,
    spent: String,
    remaining: String,
    status_label: String,
    status_class: String,
    activity_count: usize,
    categories: Vec<CategoryRow>,
}

async fn budget_page(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = load_owned_trip(&state, user, &trip_id).await?;
    let days = state.store.load_days(&trip.id).await?;

    let spent = stats::trip_total_cost(&days);
    let (budget, remaining, status) = match trip.budget {
        Some(budget) => (
            format!("{budget:.2}"),
            format!("{:.2}", stats::budget_remaining(budget, spent)),
            Some(stats::budget_status(budget, spent)),
        ),
        None => (String::new(), String::new(), None),
    };

    let categories = stats::category_breakdown(&days)
        .into_iter()
        .map(|(name, count)| CategoryRow { name, count })
        .collect();

    Ok(AskamaTemplateResponse::into_response(BudgetTemplate {
        trip_id: trip.id.clone(),
        name: trip.name.clone(),
        has_budget: trip.budget.is_some(),
        budget,
        spent: format!("{spent:.2}"),
        remaining,
        status_label: status.map(|s| s.label().to_string()).unwrap_or_default(),
        status_class: status
            .map(|s| s.css_class().to_string())
            .unwrap_or_default(),
        activity_count: stats::trip_activity_count(&days),
        categories,
    }))
}

async fn find_day(
    state: &AppState,
    trip_id: &str,
    day_id: &str,
) -> Result<ItineraryDay, AppError> {
    let days = state.store.load_days(trip_id).await?;
    days.into_iter()
        .find(|day| day.id == day_id)
        .ok_or(AppError::NotFound)
}

fn apply_activity_form(activity: &mut Activity, form: ActivityForm) -> Result<(), AppError> {
    activity.description = normalize_optional(form.description);
    activity.location = normalize_optional(form.location);
    activity.start_time = normalize_optional(form.start_time);
    activity.end_time = normalize_optional(form.end_time);
    activity.cost = parse_amount(form.cost)?;
    activity.category = normalize_optional(form.category);
    Ok(())
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_date(input: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Ungültiges Datum: {input}")))
}

fn parse_date_range(start: &str, end: &str) -> Result<(NaiveDate, NaiveDate), AppError> {
    let start_date = parse_date(start)?;
    let end_date = parse_date(end)?;
    if end_date < start_date {
        return Err(AppError::BadRequest(
            "Das Enddatum liegt vor dem Startdatum.".into(),
        ));
    }
    Ok((start_date, end_date))
}

fn parse_amount(input: Option<String>) -> Result<Option<f64>, AppError> {
    match normalize_optional(input) {
        None => Ok(None),
        Some(raw) => {
            let amount: f64 = raw
                .replace(',', ".")
                .parse()
                .map_err(|_| AppError::BadRequest(format!("Ungültiger Betrag: {raw}")))?;
            if amount < 0.0 {
                return Err(AppError::BadRequest(
                    "Beträge dürfen nicht negativ sein.".into(),
                ));
            }
            Ok(Some(amount))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_parsing_accepts_comma_decimals() {
        assert_eq!(parse_amount(Some("12,50".into())).unwrap(), Some(12.5));
        assert_eq!(parse_amount(Some(" 30 ".into())).unwrap(), Some(30.0));
        assert_eq!(parse_amount(Some("".into())).unwrap(), None);
        assert_eq!(parse_amount(None).unwrap(), None);
        assert!(parse_amount(Some("abc".into())).is_err());
        assert!(parse_amount(Some("-5".into())).is_err());
    }

    #[test]
    fn date_range_must_not_be_inverted() {
        assert!(parse_date_range("2026-05-01", "2026-05-03").is_ok());
        assert!(parse_date_range("2026-05-03", "2026-05-01").is_err());
        assert!(parse_date("01.05.2026").is_err());
    }
}
