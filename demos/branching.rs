use commitdb_client::{ConflictResolution, MergeOutcome, Session, Value};

fn main() -> anyhow::Result<()> {
    let mut session = Session::from_env().map_err(anyhow::Error::msg)?;
    session.open()?;

    session.create_database("demo")?;
    session.create_table("demo", "items", "id INT PRIMARY KEY, value STRING")?;
    session.insert("demo", "items", &["id", "value"], [Value::from(1), Value::from("base")])?;

    let mut workflow = session.merge_workflow();
    let main_branch = workflow
        .current_branch()?
        .unwrap_or_else(|| "master".to_owned());
    workflow.create_branch("feature")?;
    workflow.checkout("feature")?;
    drop(workflow);

    session.execute("UPDATE demo.items SET value = 'feature' WHERE id = 1")?;
    session.merge_workflow().checkout(&main_branch)?;
    session.execute("UPDATE demo.items SET value = 'main' WHERE id = 1")?;

    let mut workflow = session.merge_workflow();
    match workflow.merge_manual("feature")? {
        MergeOutcome::Merged(result) => println!("merged cleanly: {result:?}"),
        MergeOutcome::Pending(conflicts) => {
            for conflict in &conflicts {
                println!(
                    "{}: head={:?} source={:?}",
                    conflict.path(),
                    conflict.head,
                    conflict.source
                );
                workflow.resolve(conflict, &ConflictResolution::Source)?;
            }
            workflow.commit_merge()?;
        }
    }

    for row in &session.query("SELECT * FROM demo.items")? {
        println!("{row:?}");
    }

    session.drop_database("demo")?;
    Ok(())
}
