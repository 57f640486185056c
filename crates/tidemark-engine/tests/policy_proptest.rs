use proptest::prelude::*;
use tidemark_engine::config::parser;
use tidemark_engine::config::validator;
use tidemark_engine::load::load;
use tidemark_engine::resolve::build_graph;
use tidemark_types::table::{LoadPolicy, TableDescriptor};
use tidemark_warehouse::{SqliteConnector, WarehouseConnector};

const HEADER: &str = r#"
version: "1.0"
pipeline: prop_pipeline
warehouse:
  backend: sqlite
  connection: ":memory:"
"#;

/// One load task per entry; `deps[i]` is a bitmask over tasks `0..i`.
fn chain_yaml(deps: &[u8], back_edge: bool) -> String {
    let mut yaml = format!("{HEADER}tasks:\n");
    for (i, mask) in deps.iter().enumerate() {
        let mut depends_on: Vec<String> = (0..i)
            .filter(|j| mask & (1 << j) != 0)
            .map(|j| format!("t{j}"))
            .collect();
        if back_edge && i == 0 {
            depends_on.push(format!("t{}", deps.len() - 1));
        }
        yaml.push_str(&format!(
            "  - name: t{i}\n    depends_on: [{}]\n    load: {{ table: t{i}, policy: append, sql: SELECT 1 }}\n",
            depends_on.join(", ")
        ));
    }
    yaml
}

proptest! {
    #[test]
    fn parallelism_must_be_positive(max_parallel in 0_u32..4) {
        let yaml = format!(
            "{HEADER}resources:\n  max_parallel_tasks: {max_parallel}\ntasks:\n  - name: load_users\n    load: {{ table: users, policy: append, sql: SELECT 1 }}\n"
        );

        let config = parser::parse_pipeline_str(&yaml).expect("generated yaml must parse");
        let result = validator::validate_pipeline(&config);

        if max_parallel == 0 {
            prop_assert!(result.is_err());
        } else {
            prop_assert!(result.is_ok());
        }
    }

    #[test]
    fn not_null_requires_column(has_column in any::<bool>()) {
        let column = if has_column { ", column: user_id" } else { "" };
        let yaml = format!(
            r#"{HEADER}tasks:
  - name: checks
    quality_check:
      checks:
        - {{ name: users_id_not_null, kind: not_null, table: users{column} }}
"#
        );

        let config = parser::parse_pipeline_str(&yaml).expect("generated yaml must parse");
        let result = validator::validate_pipeline(&config);

        if has_column {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn levels_respect_dependencies(deps in prop::collection::vec(any::<u8>(), 1..8)) {
        let config = parser::parse_pipeline_str(&chain_yaml(&deps, false))
            .expect("generated yaml must parse");
        prop_assert!(validator::validate_pipeline(&config).is_ok());

        let graph = build_graph(&config).expect("acyclic graph must build");
        let levels = graph.levels();
        let level_of = |name: &str| levels.iter().position(|l| l.contains(&name));

        prop_assert_eq!(levels.iter().map(Vec::len).sum::<usize>(), deps.len());
        for task in graph.tasks() {
            let own = level_of(task.name.as_str()).expect("every task has a level");
            for dep in &task.depends_on {
                let upstream = level_of(dep.as_str()).expect("every dependency has a level");
                prop_assert!(upstream < own, "{} at {} depends on {} at {}", task.name, own, dep, upstream);
            }
        }
    }

    #[test]
    fn back_edge_to_last_task_is_cycle(len in 2_usize..6) {
        // Path t0 -> t1 -> ... -> t(len-1), closed by t0 depending on the last.
        let chained: Vec<u8> = (0..len)
            .map(|i| if i == 0 { 0 } else { 1 << (i - 1) })
            .collect();
        let config = parser::parse_pipeline_str(&chain_yaml(&chained, true))
            .expect("generated yaml must parse");

        let err = validator::validate_pipeline(&config).unwrap_err().to_string();
        prop_assert!(err.contains("dependency cycle among tasks"), "{}", err);
    }

    #[test]
    fn load_policy_row_counts(prior in 0_i64..5, incoming in 0_i64..5, append in any::<bool>()) {
        let mut warehouse = SqliteConnector::in_memory().unwrap().connect().unwrap();
        warehouse.execute("CREATE TABLE users (user_id INTEGER)").unwrap();
        warehouse.execute("CREATE TABLE staging_events (userId INTEGER)").unwrap();
        for id in 0..prior {
            warehouse.execute(&format!("INSERT INTO users VALUES ({id})")).unwrap();
        }
        for id in 0..incoming {
            warehouse
                .execute(&format!("INSERT INTO staging_events VALUES ({})", 100 + id))
                .unwrap();
        }

        let policy = if append { LoadPolicy::Append } else { LoadPolicy::TruncateInsert };
        let descriptor = TableDescriptor {
            table: "users".into(),
            columns: vec!["user_id".into()],
            select_sql: "SELECT userId FROM staging_events".into(),
            policy,
        };
        let result = load(warehouse.as_mut(), &descriptor).unwrap();
        prop_assert_eq!(i64::try_from(result.rows).unwrap(), incoming);

        let count = warehouse.query("SELECT COUNT(*) FROM users").unwrap()[0][0]
            .as_i64()
            .unwrap();
        let expected = if append { prior + incoming } else { incoming };
        prop_assert_eq!(count, expected);
    }
}
