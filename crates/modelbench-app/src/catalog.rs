//! Fixed test catalog. Every run of every configuration sees the same inputs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCase {
    pub name: &'static str,
    pub text: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSample {
    pub language: &'static str,
    pub code: &'static str,
}

impl CodeSample {
    pub fn explain_prompt(&self) -> String {
        format!("Explain this {} code:\n{}", self.language, self.code)
    }
}

pub const SMALL_PROMPT: TestCase = TestCase {
    name: "small",
    text: "What is a variable?",
};

pub const MEDIUM_PROMPT: TestCase = TestCase {
    name: "medium",
    text: "Explain this Python code:\ndef fibonacci(n):\n    if n <= 1:\n        return n\n    return fibonacci(n-1) + fibonacci(n-2)",
};

pub const LARGE_PROMPT: TestCase = TestCase {
    name: "large",
    text: r#"Review this code for best practices and potential issues:
import requests
import json

class APIClient:
    def __init__(self, base_url, api_key):
        self.base_url = base_url
        self.api_key = api_key
        self.session = requests.Session()

    def get_data(self, endpoint):
        url = self.base_url + endpoint
        headers = {'Authorization': f'Bearer {self.api_key}'}
        response = self.session.get(url, headers=headers)
        return json.loads(response.text)

    def post_data(self, endpoint, data):
        url = self.base_url + endpoint
        headers = {
            'Authorization': f'Bearer {self.api_key}',
            'Content-Type': 'application/json'
        }
        response = self.session.post(url, headers=headers, data=json.dumps(data))
        if response.status_code == 200:
            return json.loads(response.text)
        else:
            return None

    def __del__(self):
        self.session.close()
"#,
};

/// Prompt-size buckets for warm latency.
pub const SIZE_PROMPTS: [TestCase; 3] = [SMALL_PROMPT, MEDIUM_PROMPT, LARGE_PROMPT];

/// Shorter size buckets used by the latency-only quick mode.
pub const QUICK_PROMPTS: [TestCase; 3] = [
    SMALL_PROMPT,
    TestCase {
        name: "medium",
        text: "Explain this code: def factorial(n): return 1 if n <= 1 else n * factorial(n-1)",
    },
    TestCase {
        name: "large",
        text: "Review this code for issues:\ndef process_data(data):\n    result = []\n    for item in data:\n        if item > 0:\n            result.append(item * 2)\n    return result",
    },
];

pub const CODE_SAMPLES: [CodeSample; 3] = [
    CodeSample {
        language: "python",
        code: "def is_prime(n):\n    return n > 1 and all(n % i != 0 for i in range(2, int(n**0.5) + 1))",
    },
    CodeSample {
        language: "javascript",
        code: "const debounce = (func, wait) => {\n  let timeout;\n  return (...args) => {\n    clearTimeout(timeout);\n    timeout = setTimeout(() => func(...args), wait);\n  };\n};",
    },
    CodeSample {
        language: "go",
        code: "func quickSort(arr []int) []int {\n    if len(arr) < 2 {\n        return arr\n    }\n    pivot := arr[0]\n    var less, greater []int\n    for _, v := range arr[1:] {\n        if v <= pivot {\n            less = append(less, v)\n        } else {\n            greater = append(greater, v)\n        }\n    }\n    return append(append(quickSort(less), pivot), quickSort(greater)...)\n}",
    },
];

pub const QUESTIONS: [&str; 5] = [
    "What is the time complexity of binary search?",
    "How do I fix a memory leak in Node.js?",
    "What's the difference between git merge and git rebase?",
    "How can I optimize database queries in PostgreSQL?",
    "What are the SOLID principles in software design?",
];

pub const CONSISTENCY_PROMPT: &str = "What is a Python decorator?";

/// The program treats empty stdin specially, so the empty case is sent as one space.
pub const EDGE_CASES: [TestCase; 3] = [
    TestCase {
        name: "empty",
        text: " ",
    },
    TestCase {
        name: "special_chars",
        text: "Explain: 🚀 => λx.x²",
    },
    TestCase {
        name: "malformed",
        text: "def func(\n    print(",
    },
];

pub fn stability_prompt(i: u32) -> String {
    format!("Quick test {i}")
}
