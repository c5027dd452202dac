use serde::Serialize;
use serde_json::Value;

use crate::config::HasPreviousPageRule;
use crate::constants::{connection, pagination};
use crate::cursor::{get_offset_with_default, offset_to_cursor};
use crate::error::{GraphQLError, GraphQLResult};
use crate::resolve_tree::ResolveTree;

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub edges: Vec<Value>,
    pub page_info: PageInfo,
    pub total_count: i64,
}

impl Connection {
    pub fn into_value(self) -> GraphQLResult<Value> {
        serde_json::to_value(self).map_err(|e| GraphQLError::internal(e.to_string()))
    }
}

/// `first` and `after` of a connection field
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionArgs {
    pub first: Option<i64>,
    pub after: Option<String>,
}

impl ConnectionArgs {
    pub fn from_tree(tree: &ResolveTree) -> GraphQLResult<Self> {
        let args = Self {
            first: tree.arg_i64(pagination::FIRST)?,
            after: tree.arg_str(pagination::AFTER)?.map(str::to_string),
        };
        args.validate()?;
        Ok(args)
    }

    pub fn validate(&self) -> GraphQLResult<()> {
        match self.first {
            Some(first) if first < 0 => Err(GraphQLError::validation(
                "Argument \"first\" must be a non-negative integer",
            )),
            _ => Ok(()),
        }
    }

    /// Offset of the last edge before this page, -1 when there is none
    pub fn last_offset(&self) -> i64 {
        get_offset_with_default(self.after.as_deref(), -1)
    }

    /// Rows to skip in the database to land on the first edge of this page
    pub fn skip(&self) -> Option<i64> {
        let start = self.last_offset().saturating_add(1);
        (start > 0).then_some(start)
    }
}

/// Assigns cursors to a page of edges and derives its page info.
///
/// `edges` is the already sliced page. The cursor of edge `i` encodes `sliceStart + i`, where
/// `sliceStart` is one past the decoded `after` offset.
pub fn create_connection_with_edge_properties(
    edges: Vec<Value>,
    args: &ConnectionArgs,
    total_count: i64,
    rule: HasPreviousPageRule,
) -> GraphQLResult<Connection> {
    args.validate()?;
    let last_offset = args.last_offset();
    let slice_start = last_offset.saturating_add(1);

    let edges: Vec<Value> = edges
        .into_iter()
        .enumerate()
        .map(|(index, edge)| {
            let offset = usize::try_from(slice_start)
                .unwrap_or_default()
                .saturating_add(index);
            let cursor = Value::String(offset_to_cursor(offset));
            match edge {
                Value::Object(mut map) => {
                    map.insert(connection::CURSOR.to_string(), cursor);
                    Value::Object(map)
                }
                node => {
                    let mut map = serde_json::Map::new();
                    map.insert(connection::NODE.to_string(), node);
                    map.insert(connection::CURSOR.to_string(), cursor);
                    Value::Object(map)
                }
            }
        })
        .collect();

    let cursor_of = |edge: Option<&Value>| {
        edge.and_then(|e| e.get(connection::CURSOR))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let page_info = PageInfo {
        start_cursor: cursor_of(edges.first()),
        end_cursor: cursor_of(edges.last()),
        has_next_page: args
            .first
            .map(|first| slice_start.saturating_add(first) < total_count)
            .unwrap_or(false),
        has_previous_page: rule.has_previous_page(last_offset),
    };

    Ok(Connection {
        edges,
        page_info,
        total_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::cursor_to_offset;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::json;

    fn items(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"node": {"i": i}})).collect()
    }

    fn offsets(connection: &Connection) -> Vec<usize> {
        connection
            .edges
            .iter()
            .map(|e| cursor_to_offset(e["cursor"].as_str().unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn first_page_without_arguments_test() {
        let res = create_connection_with_edge_properties(
            items(20),
            &ConnectionArgs::default(),
            50,
            HasPreviousPageRule::PositiveOffset,
        );
        assert!(res.is_ok());
        let res = res.unwrap();
        assert_eq!(offsets(&res), (0..20).collect::<Vec<_>>());
        assert!(!res.page_info.has_next_page);
        assert!(!res.page_info.has_previous_page);
        assert_eq!(res.total_count, 50);
        assert_eq!(res.page_info.start_cursor, Some(offset_to_cursor(0)));
        assert_eq!(res.page_info.end_cursor, Some(offset_to_cursor(19)));
    }

    #[test]
    fn page_after_cursor_test() {
        let args = ConnectionArgs {
            first: None,
            after: Some(offset_to_cursor(10)),
        };
        for rule in [
            HasPreviousPageRule::PositiveOffset,
            HasPreviousPageRule::AnyPriorOffset,
        ] {
            let res = create_connection_with_edge_properties(items(20), &args, 50, rule).unwrap();
            assert_eq!(offsets(&res), (11..31).collect::<Vec<_>>());
            assert!(res.page_info.has_previous_page);
        }
    }

    #[test]
    fn has_next_page_needs_first_test() {
        let args = ConnectionArgs {
            first: Some(20),
            after: None,
        };
        let res = create_connection_with_edge_properties(
            items(20),
            &args,
            50,
            HasPreviousPageRule::default(),
        )
        .unwrap();
        assert!(res.page_info.has_next_page);

        let args = ConnectionArgs {
            first: Some(20),
            after: Some(offset_to_cursor(29)),
        };
        let res = create_connection_with_edge_properties(
            items(20),
            &args,
            50,
            HasPreviousPageRule::default(),
        )
        .unwrap();
        assert!(!res.page_info.has_next_page);
    }

    #[test]
    fn negative_first_test() {
        let args = ConnectionArgs {
            first: Some(-1),
            after: None,
        };
        let res = create_connection_with_edge_properties(
            items(3),
            &args,
            3,
            HasPreviousPageRule::default(),
        );
        assert!(res.unwrap_err().is_validation());

        let tree = ResolveTree::new("moviesConnection").with_arg("first", json!(-1));
        assert!(ConnectionArgs::from_tree(&tree).unwrap_err().is_validation());
    }

    #[test]
    fn invalid_cursor_is_unset_test() {
        let invalid = ConnectionArgs {
            first: Some(5),
            after: Some("not-a-cursor".to_string()),
        };
        let unset = ConnectionArgs {
            first: Some(5),
            after: None,
        };
        let rule = HasPreviousPageRule::default();
        assert_eq!(
            create_connection_with_edge_properties(items(5), &invalid, 12, rule).unwrap(),
            create_connection_with_edge_properties(items(5), &unset, 12, rule).unwrap()
        );
        assert_eq!(invalid.skip(), None);
    }

    #[test]
    fn cursors_are_contiguous_test() {
        for after in [None, Some(0usize), Some(3), Some(41)] {
            for first in [None, Some(0i64), Some(1), Some(7)] {
                let args = ConnectionArgs {
                    first,
                    after: after.map(offset_to_cursor),
                };
                let n = first.unwrap_or(5) as usize;
                let res = create_connection_with_edge_properties(
                    items(n),
                    &args,
                    100,
                    HasPreviousPageRule::default(),
                )
                .unwrap();
                let start = after.map(|a| a + 1).unwrap_or(0);
                assert_eq!(offsets(&res), (start..start + n).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn previous_page_rules_at_boundary_test() {
        let args = ConnectionArgs {
            first: None,
            after: Some(offset_to_cursor(0)),
        };
        let positive = create_connection_with_edge_properties(
            items(1),
            &args,
            5,
            HasPreviousPageRule::PositiveOffset,
        )
        .unwrap();
        let any = create_connection_with_edge_properties(
            items(1),
            &args,
            5,
            HasPreviousPageRule::AnyPriorOffset,
        )
        .unwrap();
        assert!(!positive.page_info.has_previous_page);
        assert!(any.page_info.has_previous_page);
    }

    #[test]
    fn bare_nodes_are_wrapped_test() {
        let res = create_connection_with_edge_properties(
            vec![json!("x")],
            &ConnectionArgs::default(),
            1,
            HasPreviousPageRule::default(),
        )
        .unwrap()
        .into_value()
        .unwrap();
        assert_eq!(res["edges"][0]["node"], json!("x"));
        assert_eq!(res["pageInfo"]["hasNextPage"], json!(false));
        assert_eq!(res["totalCount"], json!(1));
        let args = ConnectionArgs {
            first: None,
            after: Some(offset_to_cursor(4)),
        };
        assert_eq!(args.skip(), Some(5));
    }

    #[test]
    fn oversized_cursor_and_first_test() {
        let forged = STANDARD.encode(format!("arrayconnection:{}", i64::MAX));
        let args = ConnectionArgs {
            first: Some(5),
            after: Some(forged),
        };
        assert_eq!(args.last_offset(), -1);
        assert_eq!(args.skip(), None);
        let res = create_connection_with_edge_properties(
            items(5),
            &args,
            12,
            HasPreviousPageRule::default(),
        );
        assert!(res.is_ok());
        let res = res.unwrap();
        assert_eq!(offsets(&res), (0..5).collect::<Vec<_>>());
        assert!(res.page_info.has_next_page);

        let args = ConnectionArgs {
            first: Some(i64::MAX),
            after: Some(offset_to_cursor(3)),
        };
        let res = create_connection_with_edge_properties(
            items(2),
            &args,
            6,
            HasPreviousPageRule::default(),
        );
        assert!(res.is_ok());
        let res = res.unwrap();
        assert_eq!(offsets(&res), vec![4, 5]);
        assert!(!res.page_info.has_next_page);
        assert_eq!(args.skip(), Some(4));
    }
}
