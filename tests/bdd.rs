use std::{fmt, fs::File, net::SocketAddr};

use anyhow::Context;
use cucumber::{given, then, when, World as _};
use tempfile::TempDir;
use tokio::sync::broadcast;
use wayfare::{
    auth::{self, AuthenticatedUser},
    config::AppConfig,
    db::init_pool,
    itinerary,
    models::day::{Activity, ItineraryDay},
    models::trip::Trip,
    services::store::{StoreChange, TripStore},
    state::AppState,
    stats,
};

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    traveller: Option<AuthenticatedUser>,
    trip_id: Option<String>,
    changes: Option<ChangeFeed>,
}

impl AppWorld {
    fn app_state(&self) -> &AppState {
        self.state
            .as_ref()
            .expect("state must be initialised first")
            .app()
    }

    fn trip_id(&self) -> &str {
        self.trip_id
            .as_deref()
            .expect("a trip must be created first")
    }

    async fn load_days(&self) -> Vec<ItineraryDay> {
        self.app_state()
            .store
            .load_days(self.trip_id())
            .await
            .expect("load days")
    }

    async fn day_by_title(&self, title: &str) -> ItineraryDay {
        self.load_days()
            .await
            .into_iter()
            .find(|day| day.title == title)
            .unwrap_or_else(|| panic!("no day titled {title}"))
    }
}

struct TestState {
    app: AppState,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let store_root = root.path().join("store");
        std::fs::create_dir_all(&store_root)?;

        let db_path = root.path().join("bdd.sqlite");
        File::create(&db_path)?;
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url: database_url.clone(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            store_root: store_root.clone(),
            cookie_secret: "bdd-cookie-secret".into(),
        };

        let db = init_pool(&config.database_url).await?;
        sqlx::migrate!("./migrations").run(&db).await?;

        let store = TripStore::new(config.store_root.clone());
        store.ensure_structure().await?;

        let app = AppState::new(config, db, store);
        Ok(Self { app, _root: root })
    }

    fn app(&self) -> &AppState {
        &self.app
    }
}

struct ChangeFeed(broadcast::Receiver<StoreChange>);

impl fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeFeed").finish()
    }
}

#[given("a fresh application state")]
async fn given_fresh_state(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.traveller = None;
    world.trip_id = None;
    world.changes = None;
}

#[given(regex = r#"^a registered traveller "([^"]+)"$"#)]
async fn given_registered_traveller(world: &mut AppWorld, username: String) {
    let email = format!("{username}@example.org");
    let created = auth::register_user(world.app_state(), &username, &email, "reisepasswort")
        .await
        .expect("register traveller");
    world.traveller = Some(created);
}

#[given(regex = r#"^a trip "([^"]+)" from "([^"]+)" to "([^"]+)"$"#)]
async fn given_trip(world: &mut AppWorld, name: String, start: String, end: String) {
    let owner = world
        .traveller
        .as_ref()
        .expect("traveller must exist before creating trips");
    let trip = Trip::new(
        &owner.uuid,
        &name,
        start.parse().expect("start date"),
        end.parse().expect("end date"),
    );
    world
        .app_state()
        .store
        .save_trip(&trip)
        .await
        .expect("save trip");
    world.trip_id = Some(trip.id);
}

#[given(regex = r#"^the trip budget is ([\d.]+)$"#)]
async fn given_trip_budget(world: &mut AppWorld, budget: f64) {
    let store = &world.app_state().store;
    let mut trip = store.load_trip(world.trip_id()).await.expect("load trip");
    trip.budget = Some(budget);
    store.save_trip(&trip).await.expect("save trip");
}

#[given(regex = r#"^a day "([^"]+)" on "([^"]+)"$"#)]
#[when(regex = r#"^I add a day "([^"]+)" on "([^"]+)"$"#)]
async fn given_day(world: &mut AppWorld, title: String, date: String) {
    let days = world.load_days().await;
    let day = ItineraryDay::new(
        world.trip_id(),
        date.parse().expect("day date"),
        &title,
        days.len() as i64,
    );
    world
        .app_state()
        .store
        .save_day(&day)
        .await
        .expect("save day");
}

#[given(regex = r#"^an activity "([^"]+)" in day "([^"]+)"$"#)]
async fn given_activity(world: &mut AppWorld, name: String, day_title: String) {
    add_activity(world, name, None, None, day_title).await;
}

#[given(regex = r#"^an activity "([^"]+)" costing ([\d.]+) in category "([^"]+)" in day "([^"]+)"$"#)]
async fn given_priced_activity(
    world: &mut AppWorld,
    name: String,
    cost: f64,
    category: String,
    day_title: String,
) {
    add_activity(world, name, Some(cost), Some(category), day_title).await;
}

async fn add_activity(
    world: &mut AppWorld,
    name: String,
    cost: Option<f64>,
    category: Option<String>,
    day_title: String,
) {
    let mut day = world.day_by_title(&day_title).await;
    let mut activity = Activity::new(name);
    activity.cost = cost;
    activity.category = category;
    day.activities.push(activity);
    world
        .app_state()
        .store
        .save_day(&day)
        .await
        .expect("save day");
}

#[when("I subscribe to store changes")]
async fn when_subscribe(world: &mut AppWorld) {
    world.changes = Some(ChangeFeed(world.app_state().store.subscribe()));
}

#[when(regex = r"^I move the day at position (\d+) to position (\d+)$")]
async fn when_move_day(world: &mut AppWorld, source: usize, dest: usize) {
    let days = world.load_days().await;
    let days = itinerary::move_day(days, source, dest).expect("move day");
    world
        .app_state()
        .store
        .save_days(world.trip_id(), &days)
        .await
        .expect("save days");
}

#[when(regex = r#"^I move activity (\d+) of day "([^"]+)" to position (\d+) of day "([^"]+)"$"#)]
async fn when_move_activity(
    world: &mut AppWorld,
    source_index: usize,
    source_title: String,
    dest_index: usize,
    dest_title: String,
) {
    let mut source_day = world.day_by_title(&source_title).await;
    if source_title == dest_title {
        let (activities, _) = itinerary::move_activity(
            source_day.activities,
            Vec::new(),
            source_index,
            dest_index,
            true,
        )
        .expect("move activity");
        source_day.activities = activities;
        world
            .app_state()
            .store
            .save_day(&source_day)
            .await
            .expect("save day");
        return;
    }

    let mut dest_day = world.day_by_title(&dest_title).await;
    let (source_activities, dest_activities) = itinerary::move_activity(
        source_day.activities,
        dest_day.activities,
        source_index,
        dest_index,
        false,
    )
    .expect("move activity");
    source_day.activities = source_activities;
    dest_day.activities = dest_activities;
    world
        .app_state()
        .store
        .save_activity_move(world.trip_id(), &source_day, &dest_day)
        .await
        .expect("persist cross-day move");
}

#[then(regex = r#"^the day titles are "([^"]+)"$"#)]
async fn then_day_titles(world: &mut AppWorld, expected: String) {
    let titles: Vec<String> = world
        .load_days()
        .await
        .into_iter()
        .map(|day| day.title)
        .collect();
    let expected: Vec<String> = expected.split(", ").map(str::to_string).collect();
    assert_eq!(titles, expected);
}

#[then("every stored day order matches its position")]
async fn then_orders_dense(world: &mut AppWorld) {
    for (position, day) in world.load_days().await.iter().enumerate() {
        assert_eq!(day.order, position as i64, "day {} out of rank", day.title);
    }
}

#[then(regex = r#"^day "([^"]+)" has activities "([^"]*)"$"#)]
async fn then_day_activities(world: &mut AppWorld, day_title: String, expected: String) {
    let day = world.day_by_title(&day_title).await;
    let names: Vec<String> = day
        .activities
        .into_iter()
        .map(|activity| activity.name)
        .collect();
    let expected: Vec<String> = if expected.is_empty() {
        Vec::new()
    } else {
        expected.split(", ").map(str::to_string).collect()
    };
    assert_eq!(names, expected);
}

#[then(regex = r"^the trip has (\d+) activities in total$")]
async fn then_activity_count(world: &mut AppWorld, expected: usize) {
    let days = world.load_days().await;
    assert_eq!(stats::trip_activity_count(&days), expected);
}

#[then(regex = r"^the trip total cost is ([\d.]+)$")]
async fn then_total_cost(world: &mut AppWorld, expected: f64) {
    let days = world.load_days().await;
    assert!((stats::trip_total_cost(&days) - expected).abs() < f64::EPSILON);
}

#[then(regex = r#"^the category "([^"]+)" counts (\d+) activities$"#)]
async fn then_category_count(world: &mut AppWorld, category: String, expected: usize) {
    let days = world.load_days().await;
    let breakdown = stats::category_breakdown(&days);
    assert_eq!(breakdown.get(&category), Some(&expected));
}

#[then(regex = r#"^the budget status is "([^"]+)"$"#)]
async fn then_budget_status(world: &mut AppWorld, expected: String) {
    let store = &world.app_state().store;
    let trip = store.load_trip(world.trip_id()).await.expect("load trip");
    let budget = trip.budget.expect("trip must have a budget");
    let days = world.load_days().await;
    let status = match stats::budget_status(budget, stats::trip_total_cost(&days)) {
        stats::BudgetStatus::Good => "good",
        stats::BudgetStatus::Warning => "warning",
        stats::BudgetStatus::Over => "over",
    };
    assert_eq!(status, expected);
}

#[then("a day change notification for the trip is broadcast")]
async fn then_change_broadcast(world: &mut AppWorld) {
    let trip_id = world.trip_id().to_string();
    let feed = world
        .changes
        .as_mut()
        .expect("subscribe before asserting on notifications");
    let mut seen = false;
    while let Ok(change) = feed.0.try_recv() {
        if change == (StoreChange::Days { trip_id: trip_id.clone() }) {
            seen = true;
        }
    }
    assert!(seen, "no day change broadcast for trip {trip_id}");
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
