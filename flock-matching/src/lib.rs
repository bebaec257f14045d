pub mod commutes;
pub mod config;
pub mod decisions;
pub mod events;
pub mod geo;
pub mod lifecycle;
pub mod models;
pub mod routes;
pub mod routing;
pub mod scoring;
pub mod selection;
pub mod snapshot;
pub mod store;
pub mod users;

use commutes::CommuteRepository;
use config::AppConfig;
use flock_shared::clients::{MongoClient, RabbitMQClient};
use routing::PlannerClient;
use store::MongoStore;
use users::UserRepository;

pub struct AppState {
    pub store: MongoStore,
    pub config: AppConfig,
    pub rabbitmq: RabbitMQClient,
    pub planner: PlannerClient,
    pub commute_repo: CommuteRepository,
    pub user_repo: UserRepository,
}

impl AppState {
    pub fn new(mongo: &MongoClient, config: AppConfig, rabbitmq: RabbitMQClient, planner: PlannerClient) -> Self {
        Self {
            store: MongoStore::new(mongo),
            commute_repo: CommuteRepository::new(mongo),
            user_repo: UserRepository::new(mongo),
            config,
            rabbitmq,
            planner,
        }
    }
}
