use commitdb_client::{Session, Value};

fn main() -> anyhow::Result<()> {
    let mut session = Session::from_env().map_err(anyhow::Error::msg)?;
    session.open()?;

    session.create_database("demo")?;
    session.create_table("demo", "users", "id INT PRIMARY KEY, name STRING")?;
    session.insert("demo", "users", &["id", "name"], [Value::from(1), Value::from("Kit")])?;

    let result = session.query("SELECT * FROM demo.users")?;
    for row in &result {
        println!("{row:?}");
    }

    session.drop_database("demo")?;
    session.close();
    Ok(())
}
