// Import the library functions
use serde_json::{json, Value};
use std::io::Cursor;
use taskgrid_worker::server::serve;
use taskgrid_worker::WorkerConfig;

// Stdio session driven with in-memory input and output
#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cell() -> Value {
        json!({
            "type": "Feature",
            "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]]},
            "properties": {"taskId": 1}
        })
    }

    fn points(coords: &[[f64; 2]]) -> Value {
        let features: Vec<Value> = coords
            .iter()
            .map(|c| json!({"type": "Feature", "geometry": {"type": "Point", "coordinates": c}, "properties": {}}))
            .collect();
        json!({"type": "FeatureCollection", "features": features})
    }

    fn run_session(lines: &[String]) -> Vec<Value> {
        let input = Cursor::new(lines.join("\n"));
        let output = serve(input, Vec::new(), WorkerConfig::default()).expect("session failed");
        String::from_utf8(output)
            .expect("output is not utf-8")
            .lines()
            .map(|l| serde_json::from_str(l).expect("output line is not JSON"))
            .collect()
    }

    #[test]
    fn test_rpc_requests_are_answered_with_caller_ids() {
        let grid = json!({"type": "FeatureCollection", "features": [unit_cell()]});
        let lines = vec![
            json!({"id": "extent-1", "method": "findExtent", "params": {"geometries": points(&[[0.0, 0.0], [2.0, 3.0]])}})
                .to_string(),
            json!({"id": 7, "method": "clipTaskDataAndFilter", "params": {"taskGrid": grid, "geometries": points(&[[0.5, 0.5]])}})
                .to_string(),
        ];

        let replies = run_session(&lines);

        let extent = replies.iter().find(|r| r["id"] == "extent-1").expect("no extent reply");
        assert_eq!(extent["type"], "findExtent");
        assert_eq!(extent["extent"]["geometry"]["coordinates"][0][2], json!([2.0, 3.0]));

        let progress: Vec<&Value> = replies.iter().filter(|r| r["id"] == 7 && r["type"] == "progress").collect();
        assert_eq!(progress.len(), 1, "one progress reply per cell");
        assert_eq!(progress[0]["progress"], json!(1.0));

        let result = replies
            .iter()
            .find(|r| r["id"] == 7 && r["type"] == "clipTaskDataAndFilter")
            .expect("no filter reply");
        let cells = result["taskGeometry"].as_array().unwrap();
        assert_eq!(cells.len(), 1);
        assert!(cells[0]["properties"]["geometries"].is_string());
        assert!(result.get("skipped").is_none());
    }

    #[test]
    fn test_positional_request_form() {
        let grid = json!({"type": "FeatureCollection", "features": [unit_cell()]});
        let lines = vec![json!(["clipTaskDataAndFilter", grid, points(&[[2.0, 2.0]])]).to_string()];

        let replies = run_session(&lines);

        let result = replies.last().expect("no replies");
        assert_eq!(result["type"], "clipTaskDataAndFilter");
        assert_eq!(result["id"], Value::Null);
        assert_eq!(result["taskGeometry"], json!([]));
    }

    #[test]
    fn test_bad_requests_get_error_codes() {
        let lines = vec![
            "this is not json".to_string(),
            json!({"id": 1, "method": "simplify", "params": {}}).to_string(),
            json!({"id": 2, "method": "findExtent", "params": {"geometries": 5}}).to_string(),
            String::new(),
            json!({"id": 3, "method": "findExtent", "params": {"geometries": {"type": "FeatureCollection", "features": []}}})
                .to_string(),
        ];

        let replies = run_session(&lines);

        assert_eq!(replies.len(), 3, "unparsable and empty lines get no reply");
        let by_id = |id: i64| replies.iter().find(|r| r["id"] == id).expect("missing reply");
        assert_eq!(by_id(1)["error"]["code"], -32601);
        assert_eq!(by_id(2)["error"]["code"], -32602);
        assert_eq!(by_id(3)["type"], "error");
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let extent = json!({"id": "after", "method": "findExtent", "params": {"geometries": points(&[[1.0, 1.0]])}});
        let mut input = b"\xff\xfe garbage\n".to_vec();
        input.extend_from_slice(extent.to_string().as_bytes());
        input.push(b'\n');

        let output = serve(Cursor::new(input), Vec::new(), WorkerConfig::default()).expect("session failed");
        let replies: Vec<Value> = String::from_utf8(output)
            .expect("output is not utf-8")
            .lines()
            .map(|l| serde_json::from_str(l).expect("output line is not JSON"))
            .collect();

        assert_eq!(replies.len(), 1, "the request after the bad line must still be answered");
        assert_eq!(replies[0]["id"], "after");
        assert_eq!(replies[0]["type"], "findExtent");
    }
}
