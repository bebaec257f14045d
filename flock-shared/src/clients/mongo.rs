use mongodb::{Client, Database};

#[derive(Clone)]
pub struct MongoClient {
    database: Database,
}

impl MongoClient {
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, mongodb::error::Error> {
        let client = Client::with_uri_str(uri).await?;
        let database = client.database(db_name);
        tracing::info!(db = %db_name, "connected to MongoDB");
        Ok(Self { database })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn collection<T>(&self, name: &str) -> mongodb::Collection<T>
    where
        T: Send + Sync,
    {
        self.database.collection(name)
    }
}
